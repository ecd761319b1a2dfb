//! Runs against a live MongoDB server:
//! `DB_URL=localhost:27017 cargo test -p pokedex_core --test mongo_store -- --ignored`

use pokedex_core::expr::{eq, pull};
use pokedex_core::{
    Attack, ConnectionError, Creature, CreatureRepository, Document, StoreConfig,
    StoreConnection, StoreCreatureRepository, CREATURE_COLLECTION,
};
use serde_json::{json, Value};

/// Throwaway database on the server named by `DB_URL`.
struct ScratchDatabase {
    conn: StoreConnection,
}

impl ScratchDatabase {
    fn connect() -> Self {
        let database = format!("pokedex_test_{}", uuid::Uuid::new_v4().simple());
        let config = StoreConfig::from_lookup(|key: &str| match key {
            "DB_NAME" => Some(database.clone()),
            other => std::env::var(other).ok(),
        })
        .expect("DB_URL must point at a MongoDB server");
        Self {
            conn: StoreConnection::connect(&config).unwrap(),
        }
    }
}

impl Drop for ScratchDatabase {
    fn drop(&mut self) {
        let _ = self.conn.drop_database(self.conn.database_name());
    }
}

fn pikachu() -> Creature {
    Creature::new("Pikachu", "Kanto", 25, "Electric")
        .with_level(12)
        .with_attack(Attack::new("Quick Attack", "Normal"))
        .with_attack(Attack::new("Thunderbolt", "Normal"))
}

#[test]
#[ignore] // requires a running MongoDB server
fn repository_round_trip_on_mongodb() {
    let scratch = ScratchDatabase::connect();
    let repo = StoreCreatureRepository::new(&scratch.conn);

    let id = repo.insert(&pikachu()).unwrap();
    assert!(matches!(id.as_value(), Value::Object(map) if map.contains_key("$oid")));
    assert_eq!(repo.find(&eq("name", "Pikachu")).unwrap(), vec![pikachu()]);

    let raw = scratch.conn.find(CREATURE_COLLECTION, &id.to_filter()).unwrap();
    assert_eq!(raw.len(), 1);

    let modified = repo
        .update_attack("Pikachu", "Thunderbolt", &eq("type", "Electric"))
        .unwrap();
    assert_eq!(modified, 1);
    let found = repo.find(&eq("name", "Pikachu")).unwrap();
    assert_eq!(
        found[0].attack("Thunderbolt"),
        Some(&Attack::new("Thunderbolt", "Electric"))
    );

    assert_eq!(repo.delete_attack("Pikachu", "Thunderbolt").unwrap(), 1);
    assert_eq!(repo.delete(&eq("name", "Pikachu")).unwrap(), 1);
    assert!(repo.find(&Document::new()).unwrap().is_empty());
}

#[test]
#[ignore] // requires a running MongoDB server
fn collection_management_on_mongodb() {
    let scratch = ScratchDatabase::connect();
    let conn = &scratch.conn;

    assert!(conn.create_collection("Trainers").unwrap());
    assert!(!conn.create_collection("Trainers").unwrap());

    let db_name = conn.database_name().to_string();
    assert!(conn.create_database_and_collection(&db_name, "Pokemon").unwrap());
    assert!(!conn.create_database_and_collection(&db_name, "Pokemon").unwrap());
    assert!(conn.find("Pokemon", &Document::new()).unwrap().is_empty());

    let mut names = conn.list_collections().unwrap();
    names.sort();
    assert_eq!(names, vec!["Pokemon".to_string(), "Trainers".to_string()]);

    assert!(conn.drop_collection("Trainers").unwrap());
    assert!(!conn.drop_collection("Trainers").unwrap());
}

#[test]
#[ignore] // requires a running MongoDB server
fn pull_on_null_field_is_rejected_on_mongodb() {
    let scratch = ScratchDatabase::connect();
    let conn = &scratch.conn;
    conn.insert("Pokemon", json!({ "name": "Ditto", "attacks": null }))
        .unwrap();

    let err = conn
        .apply_update(
            "Pokemon",
            &eq("name", "Ditto"),
            &pull("attacks", json!({ "name": "Transform" })),
        )
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Store { operation: "apply_update", .. }));
}
