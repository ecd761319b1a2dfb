use pokedex_core::expr::{eq, parse_document};
use pokedex_core::{
    Attack, ConnectionError, Creature, CreatureRepository, Document, RepoError, StoreConnection,
    StoreCreatureRepository, CREATURE_COLLECTION,
};
use serde_json::json;

fn connection() -> StoreConnection {
    StoreConnection::open_embedded_in_memory("pokedex").unwrap()
}

fn bulbasaur() -> Creature {
    Creature::new("Bulbasaur", "Kanto", 1, "Grass")
        .with_secondary_type("Poison")
        .with_level(5)
        .with_attack(Attack::new("Vine Whip", "Grass"))
}

fn pikachu() -> Creature {
    Creature::new("Pikachu", "Kanto", 25, "Electric")
        .with_level(12)
        .with_attack(Attack::new("Quick Attack", "Normal"))
        .with_attack(Attack::new("Thunderbolt", "Normal"))
}

#[test]
fn insert_then_find_by_name_roundtrip() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);

    repo.insert(&bulbasaur()).unwrap();

    let found = repo.find(&eq("name", "Bulbasaur")).unwrap();
    assert_eq!(found, vec![bulbasaur()]);
}

#[test]
fn creature_without_attacks_roundtrips() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);

    let magikarp = Creature::new("Magikarp", "Kanto", 129, "Water");
    let ditto = Creature::new("Ditto", "Kanto", 132, "Normal").with_attacks(Vec::<Attack>::new());
    repo.insert(&magikarp).unwrap();
    repo.insert(&ditto).unwrap();

    assert_eq!(repo.find(&eq("name", "Magikarp")).unwrap(), vec![magikarp]);
    assert_eq!(repo.find(&eq("name", "Ditto")).unwrap(), vec![ditto]);
}

#[test]
fn stored_document_uses_collection_and_carries_identity() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);

    let id = repo.insert(&bulbasaur()).unwrap();

    let raw = conn.find(CREATURE_COLLECTION, &Document::new()).unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].get("_id"), Some(id.as_value()));
    assert_eq!(raw[0].get("attacks"), Some(&json!([{ "name": "Vine Whip", "type": "Grass" }])));
}

#[test]
fn find_without_matches_returns_empty_list() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&bulbasaur()).unwrap();

    assert!(repo.find(&eq("name", "Mewtwo")).unwrap().is_empty());
}

#[test]
fn find_by_region_and_nested_attack() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&bulbasaur()).unwrap();
    repo.insert(&pikachu()).unwrap();
    repo.insert(&Creature::new("Chikorita", "Johto", 152, "Grass")).unwrap();

    let kanto = repo.find(&eq("region", "Kanto")).unwrap();
    assert_eq!(kanto.len(), 2);

    let filter = parse_document(r#"{ "attacks.name": "Thunderbolt" }"#).unwrap();
    let found = repo.find(&filter).unwrap();
    assert_eq!(found, vec![pikachu()]);
}

#[test]
fn find_limited_caps_result_count() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    for index in 1..=4 {
        repo.insert(&Creature::new(format!("Unown {index}"), "Johto", 201, "Psychic"))
            .unwrap();
    }

    assert_eq!(repo.find_limited(&Document::new(), 3).unwrap().len(), 3);
    assert_eq!(repo.find_limited(&Document::new(), 0).unwrap().len(), 4);
}

#[test]
fn update_merges_fields_of_first_match() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&bulbasaur()).unwrap();

    let modified = repo
        .update(&eq("name", "Bulbasaur"), &eq("level", 16))
        .unwrap();
    assert_eq!(modified, 1);

    let found = repo.find(&eq("name", "Bulbasaur")).unwrap();
    assert_eq!(found, vec![bulbasaur().with_level(16)]);
}

#[test]
fn update_without_matches_returns_zero() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&bulbasaur()).unwrap();

    let modified = repo.update(&eq("name", "Missingno"), &eq("level", 99)).unwrap();
    assert_eq!(modified, 0);
}

#[test]
fn update_attack_changes_only_the_matched_attack() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&pikachu()).unwrap();

    let modified = repo
        .update_attack("Pikachu", "Thunderbolt", &eq("type", "Electric"))
        .unwrap();
    assert_eq!(modified, 1);

    let expected = Creature::new("Pikachu", "Kanto", 25, "Electric")
        .with_level(12)
        .with_attack(Attack::new("Quick Attack", "Normal"))
        .with_attack(Attack::new("Thunderbolt", "Electric"));
    assert_eq!(repo.find(&eq("name", "Pikachu")).unwrap(), vec![expected]);
}

#[test]
fn update_attack_without_matching_attack_returns_zero() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&pikachu()).unwrap();

    let modified = repo
        .update_attack("Pikachu", "Surf", &eq("type", "Water"))
        .unwrap();
    assert_eq!(modified, 0);

    let modified = repo
        .update_attack("Raichu", "Thunderbolt", &eq("type", "Electric"))
        .unwrap();
    assert_eq!(modified, 0);
    assert_eq!(repo.find(&eq("name", "Pikachu")).unwrap(), vec![pikachu()]);
}

#[test]
fn update_attack_rejects_non_attack_fields() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&pikachu()).unwrap();

    let err = repo
        .update_attack("Pikachu", "Thunderbolt", &eq("power", 90))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));

    let err = repo
        .update_attack("Pikachu", "Thunderbolt", &Document::new())
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn delete_attack_leaves_empty_attack_list() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    let raichu = Creature::new("Raichu", "Kanto", 26, "Electric")
        .with_attack(Attack::new("Thunderbolt", "Electric"));
    repo.insert(&raichu).unwrap();

    let modified = repo.delete_attack("Raichu", "Thunderbolt").unwrap();
    assert_eq!(modified, 1);

    let found = repo.find(&eq("name", "Raichu")).unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].attacks.is_empty());

    assert_eq!(repo.delete_attack("Raichu", "Thunderbolt").unwrap(), 0);
}

#[test]
fn delete_attack_removes_every_entry_with_that_name() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    let smeargle = Creature::new("Smeargle", "Johto", 235, "Normal")
        .with_attack(Attack::new("Sketch", "Normal"))
        .with_attack(Attack::new("Tackle", "Normal"))
        .with_attack(Attack::new("Sketch", "Normal"));
    repo.insert(&smeargle).unwrap();

    assert_eq!(repo.delete_attack("Smeargle", "Sketch").unwrap(), 1);

    let found = repo.find(&eq("name", "Smeargle")).unwrap();
    assert_eq!(found[0].attacks, vec![Attack::new("Tackle", "Normal")]);
}

#[test]
fn delete_removes_first_match_only() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&Creature::new("Zubat", "Kanto", 41, "Poison").with_level(3))
        .unwrap();
    repo.insert(&Creature::new("Zubat", "Kanto", 41, "Poison").with_level(7))
        .unwrap();

    assert_eq!(repo.delete(&eq("name", "Zubat")).unwrap(), 1);

    let remaining = repo.find(&eq("name", "Zubat")).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].level, 7);

    assert_eq!(repo.delete(&eq("name", "Golbat")).unwrap(), 0);
}

#[test]
fn malformed_stored_attack_fails_reconstruction() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    conn.insert(
        CREATURE_COLLECTION,
        json!({
            "name": "Porygon",
            "region": "Kanto",
            "national_index": 137,
            "primary_type": "Normal",
            "level": 1,
            "attacks": [{ "name": "Conversion" }],
        }),
    )
    .unwrap();

    let err = repo.find(&eq("name", "Porygon")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn invalid_filter_surfaces_as_connection_error() {
    let conn = connection();
    let repo = StoreCreatureRepository::new(&conn);
    repo.insert(&bulbasaur()).unwrap();

    let filter = parse_document(r#"{ "$where": "this.level > 1" }"#).unwrap();
    let err = repo.find(&filter).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Connection(ConnectionError::Store { operation: "find", .. })
    ));
}

#[test]
fn custom_collection_is_isolated_from_default() {
    let conn = connection();
    let default_repo = StoreCreatureRepository::new(&conn);
    let archive = StoreCreatureRepository::with_collection(&conn, "Archive");

    archive.insert(&bulbasaur()).unwrap();

    assert_eq!(archive.collection(), "Archive");
    assert!(default_repo.find(&Document::new()).unwrap().is_empty());
    assert_eq!(archive.find(&Document::new()).unwrap(), vec![bulbasaur()]);
}
