//! Data access layer for the Pokédex admin console.
//! Callers go through `StoreCreatureRepository` for typed records and through
//! `StoreConnection` for generic collection work.

pub mod config;
pub mod connection;
pub mod expr;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{ConfigError, Credentials, StoreConfig};
pub use connection::{ConnectionError, ConnectionResult, StoreConnection};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::creature::{Attack, Creature};
pub use repo::creature_repo::{
    CreatureRepository, RepoError, RepoResult, StoreCreatureRepository, CREATURE_COLLECTION,
};
pub use store::{Document, DocumentId, DocumentStore, Namespace, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
