//! Pokédex admin console.
//!
//! # Responsibility
//! - Open one store connection per process and dispatch one admin command.
//! - Keep store details out of the commands; everything goes through
//!   `StoreConnection` and `StoreCreatureRepository`.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use pokedex_core::expr::{and_eq, eq, parse_document};
use pokedex_core::{
    default_log_level, init_logging, Attack, Creature, CreatureRepository, Document,
    StoreConfig, StoreConnection, StoreCreatureRepository, CREATURE_COLLECTION,
};

/// Embedded database name when neither `--database` nor `DB_NAME` is set.
const DEFAULT_EMBEDDED_DATABASE: &str = "pokedex";

#[derive(Parser, Debug)]
#[command(
    name = "pokedex",
    author,
    version,
    about = "Admin console for the Pokédex document store"
)]
struct Cli {
    /// Use an embedded SQLite store file instead of MongoDB
    #[arg(long, global = true, value_name = "PATH")]
    embedded: Option<PathBuf>,

    /// Database to select in the embedded store (defaults to DB_NAME)
    #[arg(long, global = true, value_name = "NAME")]
    database: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(long, global = true, value_name = "ABS_PATH")]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a database together with a real, empty collection
    CreateDb {
        db_name: String,
        #[arg(default_value = CREATURE_COLLECTION)]
        collection: String,
    },
    /// Create a collection in the selected database
    CreateCollection { name: String },
    /// Drop a collection from the selected database
    DropCollection { name: String },
    /// List collections of the selected database
    ListCollections,
    /// Insert one creature
    Insert(InsertArgs),
    /// Search creatures by name and/or region
    Search(SearchArgs),
    /// Set the level of the first creature with this name
    UpdateLevel { name: String, level: i64 },
    /// Change one attack of a creature
    UpdateAttack(UpdateAttackArgs),
    /// Delete the first creature with this name
    Delete { name: String },
    /// Remove every attack with this name from a creature
    DeleteAttack { name: String, attack: String },
    /// Run a raw JSON filter against any collection
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct InsertArgs {
    name: String,
    region: String,
    national_index: i64,
    primary_type: String,
    #[arg(long)]
    secondary_type: Option<String>,
    #[arg(long)]
    level: Option<i64>,
    /// Attack as NAME:TYPE; repeatable
    #[arg(long = "attack", value_name = "NAME:TYPE", value_parser = parse_attack)]
    attacks: Vec<Attack>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    region: Option<String>,
    /// Maximum number of results; 0 means no limit
    #[arg(long, default_value_t = 0)]
    limit: u64,
    /// Print one JSON record per line
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct UpdateAttackArgs {
    name: String,
    attack: String,
    /// New attack name
    #[arg(long = "new-name")]
    new_name: Option<String>,
    /// New attack type
    #[arg(long = "new-type")]
    new_type: Option<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// JSON filter document; empty matches everything
    #[arg(default_value = "{}")]
    filter: String,
    #[arg(long, default_value = CREATURE_COLLECTION)]
    collection: String,
    #[arg(long, default_value_t = 0)]
    limit: u64,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(|err| anyhow!(err))?;
    }

    let conn = open_connection(&cli)?;
    info!(
        "event=console_start module=cli status=ok backend={} database={}",
        conn.backend(),
        conn.database_name()
    );
    run(&conn, cli.command)
}

fn open_connection(cli: &Cli) -> Result<StoreConnection> {
    match cli.embedded.as_ref() {
        Some(path) => {
            let database = cli
                .database
                .clone()
                .or_else(|| std::env::var(pokedex_core::config::ENV_DATABASE).ok())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EMBEDDED_DATABASE.to_string());
            StoreConnection::open_embedded(path, database)
                .with_context(|| format!("failed to open embedded store {}", path.display()))
        }
        None => {
            let config = StoreConfig::from_env().context("store configuration is incomplete")?;
            StoreConnection::connect(&config).context("failed to connect to MongoDB")
        }
    }
}

fn run(conn: &StoreConnection, command: Commands) -> Result<()> {
    let repo = StoreCreatureRepository::new(conn);

    match command {
        Commands::CreateDb {
            db_name,
            collection,
        } => {
            if conn.create_database_and_collection(&db_name, &collection)? {
                println!("Created {db_name}.{collection}");
            } else {
                println!("{db_name}.{collection} already exists");
            }
        }
        Commands::CreateCollection { name } => {
            if conn.create_collection(&name)? {
                println!("Created collection {name}");
            } else {
                println!("Collection {name} already exists");
            }
        }
        Commands::DropCollection { name } => {
            if conn.drop_collection(&name)? {
                println!("Dropped collection {name}");
            } else {
                println!("Collection {name} does not exist");
            }
        }
        Commands::ListCollections => {
            for name in conn.list_collections()? {
                println!("{name}");
            }
        }
        Commands::Insert(args) => {
            let creature = creature_from_args(args);
            let id = repo.insert(&creature)?;
            println!("Inserted {} with id {id}", creature.name);
        }
        Commands::Search(args) => {
            let filter = search_filter(args.name, args.region);
            let creatures = repo.find_limited(&filter, args.limit)?;
            if creatures.is_empty() && !args.json {
                println!("No creatures found");
            }
            for creature in &creatures {
                if args.json {
                    println!("{}", serde_json::to_string(creature)?);
                } else {
                    print_creature(creature);
                }
            }
        }
        Commands::UpdateLevel { name, level } => {
            let modified = repo.update(&eq("name", name.as_str()), &eq("level", level))?;
            println!("Modified {modified} document(s)");
        }
        Commands::UpdateAttack(args) => {
            let values = attack_values(args.new_name, args.new_type)?;
            let modified = repo.update_attack(&args.name, &args.attack, &values)?;
            report_attack_change(&repo, modified, &args.name, &args.attack)?;
        }
        Commands::Delete { name } => {
            let deleted = repo.delete(&eq("name", name.as_str()))?;
            println!("Deleted {deleted} document(s)");
        }
        Commands::DeleteAttack { name, attack } => {
            let modified = repo.delete_attack(&name, &attack)?;
            report_attack_change(&repo, modified, &name, &attack)?;
        }
        Commands::Query(args) => {
            let filter = parse_document(&args.filter)?;
            for document in conn.find_limited(&args.collection, &filter, args.limit)? {
                println!("{}", serde_json::to_string(&document)?);
            }
        }
    }

    Ok(())
}

fn parse_attack(raw: &str) -> Result<Attack, String> {
    let (name, kind) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:TYPE, got `{raw}`"))?;
    let (name, kind) = (name.trim(), kind.trim());
    if name.is_empty() || kind.is_empty() {
        return Err(format!("attack name and type cannot be empty in `{raw}`"));
    }
    Ok(Attack::new(name, kind))
}

fn creature_from_args(args: InsertArgs) -> Creature {
    let mut creature = Creature::new(
        args.name,
        args.region,
        args.national_index,
        args.primary_type,
    )
    .with_attacks(args.attacks);
    if let Some(secondary_type) = args.secondary_type {
        creature = creature.with_secondary_type(secondary_type);
    }
    if let Some(level) = args.level {
        creature = creature.with_level(level);
    }
    creature
}

fn search_filter(name: Option<String>, region: Option<String>) -> Document {
    let mut filter = Document::new();
    if let Some(name) = name {
        filter = and_eq(filter, "name", name);
    }
    if let Some(region) = region {
        filter = and_eq(filter, "region", region);
    }
    filter
}

fn attack_values(new_name: Option<String>, new_type: Option<String>) -> Result<Document> {
    let mut values = Document::new();
    if let Some(name) = new_name {
        values = and_eq(values, "name", name);
    }
    if let Some(kind) = new_type {
        values = and_eq(values, "type", kind);
    }
    if values.is_empty() {
        bail!("pass --new-name and/or --new-type");
    }
    Ok(values)
}

/// Tells "no such creature" apart from "no such attack" when nothing changed.
fn report_attack_change(
    repo: &StoreCreatureRepository<'_>,
    modified: u64,
    name: &str,
    attack: &str,
) -> Result<()> {
    if modified > 0 {
        println!("Modified {modified} document(s)");
        return Ok(());
    }
    let found = repo.find_limited(&eq("name", name), 1)?;
    match found.first() {
        None => println!("No creature named {name}"),
        Some(creature) if creature.attack(attack).is_none() => {
            println!("{name} has no attack named {attack}")
        }
        Some(_) => println!("{name}'s {attack} is already up to date"),
    }
    Ok(())
}

fn print_creature(creature: &Creature) {
    let types = match creature.secondary_type.as_deref() {
        Some(secondary) => format!("{}/{}", creature.primary_type, secondary),
        None => creature.primary_type.clone(),
    };
    println!(
        "#{:03} {} ({}) lv.{} [{}]",
        creature.national_index, creature.name, creature.region, creature.level, types
    );
    if !creature.has_attacks() {
        println!("    (no attacks)");
    }
    for attack in &creature.attacks {
        println!("    - {} ({})", attack.name, attack.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::{attack_values, parse_attack, search_filter, Cli, Commands};
    use clap::{CommandFactory, Parser};
    use pokedex_core::Attack;
    use serde_json::{json, Value};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_attack_splits_name_and_type() {
        assert_eq!(
            parse_attack("Vine Whip:Grass").unwrap(),
            Attack::new("Vine Whip", "Grass")
        );
        assert!(parse_attack("Tackle").is_err());
        assert!(parse_attack(":Normal").is_err());
    }

    #[test]
    fn insert_collects_repeated_attacks() {
        let cli = Cli::try_parse_from([
            "pokedex",
            "--embedded",
            "/tmp/pokedex.sqlite3",
            "insert",
            "Pikachu",
            "Kanto",
            "25",
            "Electric",
            "--attack",
            "Quick Attack:Normal",
            "--attack",
            "Thunderbolt:Electric",
        ])
        .unwrap();

        match cli.command {
            Commands::Insert(args) => {
                assert_eq!(args.attacks.len(), 2);
                assert_eq!(args.attacks[1], Attack::new("Thunderbolt", "Electric"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_accepts_json_output_flag() {
        let cli = Cli::try_parse_from(["pokedex", "search", "--region", "Johto", "--json"]).unwrap();
        match cli.command {
            Commands::Search(args) => {
                assert!(args.json);
                assert_eq!(args.region.as_deref(), Some("Johto"));
                assert_eq!(args.limit, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_filter_combines_given_fields() {
        let filter = search_filter(Some("Eevee".to_string()), Some("Kanto".to_string()));
        assert_eq!(
            Value::Object(filter),
            json!({ "name": "Eevee", "region": "Kanto" })
        );
        assert!(search_filter(None, None).is_empty());
    }

    #[test]
    fn attack_values_require_a_change() {
        assert!(attack_values(None, None).is_err());
        let values = attack_values(None, Some("Electric".to_string())).unwrap();
        assert_eq!(Value::Object(values), json!({ "type": "Electric" }));
    }
}
