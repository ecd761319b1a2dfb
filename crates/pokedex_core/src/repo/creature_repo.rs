//! Creature repository contract and store-backed implementation.
//!
//! # Responsibility
//! - Translate between `Creature`/`Attack` and stored documents.
//! - Provide creature-level CRUD and targeted attack updates against one
//!   collection.
//!
//! # Invariants
//! - `attacks` is always written as an array, so array operators apply.
//! - Read paths reject malformed stored documents instead of masking them.
//! - The store identity is stripped before reconstruction.

use crate::connection::{ConnectionError, StoreConnection};
use crate::expr;
use crate::model::creature::{Attack, Creature, DEFAULT_LEVEL};
use crate::store::{Document, DocumentId, ID_FIELD};
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Collection holding creature documents.
pub const CREATURE_COLLECTION: &str = "Pokemon";

/// Stored field names.
pub mod fields {
    pub const NAME: &str = "name";
    pub const REGION: &str = "region";
    pub const NATIONAL_INDEX: &str = "national_index";
    pub const PRIMARY_TYPE: &str = "primary_type";
    pub const SECONDARY_TYPE: &str = "secondary_type";
    pub const LEVEL: &str = "level";
    pub const ATTACKS: &str = "attacks";
    pub const ATTACK_NAME: &str = "name";
    pub const ATTACK_TYPE: &str = "type";
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for creature persistence and reconstruction.
#[derive(Debug)]
pub enum RepoError {
    Connection(ConnectionError),
    /// Stored document or caller-supplied values do not fit the record shape.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid creature data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ConnectionError> for RepoError {
    fn from(value: ConnectionError) -> Self {
        Self::Connection(value)
    }
}

/// Repository interface for creature CRUD operations.
pub trait CreatureRepository {
    fn insert(&self, creature: &Creature) -> RepoResult<DocumentId>;
    fn find(&self, filter: &Document) -> RepoResult<Vec<Creature>>;
    fn find_limited(&self, filter: &Document, limit: u64) -> RepoResult<Vec<Creature>>;
    fn update(&self, filter: &Document, new_values: &Document) -> RepoResult<u64>;
    fn update_attack(
        &self,
        creature_name: &str,
        attack_name: &str,
        new_values: &Document,
    ) -> RepoResult<u64>;
    fn delete(&self, filter: &Document) -> RepoResult<u64>;
    fn delete_attack(&self, creature_name: &str, attack_name: &str) -> RepoResult<u64>;
}

/// Creature repository on top of a shared `StoreConnection`.
pub struct StoreCreatureRepository<'conn> {
    conn: &'conn StoreConnection,
    collection: String,
}

impl<'conn> StoreCreatureRepository<'conn> {
    pub fn new(conn: &'conn StoreConnection) -> Self {
        Self::with_collection(conn, CREATURE_COLLECTION)
    }

    pub fn with_collection(conn: &'conn StoreConnection, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl CreatureRepository for StoreCreatureRepository<'_> {
    fn insert(&self, creature: &Creature) -> RepoResult<DocumentId> {
        let document = creature_to_document(creature);
        Ok(self
            .conn
            .insert(&self.collection, Value::Object(document))?)
    }

    fn find(&self, filter: &Document) -> RepoResult<Vec<Creature>> {
        self.conn
            .find(&self.collection, filter)?
            .into_iter()
            .map(creature_from_document)
            .collect()
    }

    fn find_limited(&self, filter: &Document, limit: u64) -> RepoResult<Vec<Creature>> {
        self.conn
            .find_limited(&self.collection, filter, limit)?
            .into_iter()
            .map(creature_from_document)
            .collect()
    }

    fn update(&self, filter: &Document, new_values: &Document) -> RepoResult<u64> {
        Ok(self.conn.update(&self.collection, filter, new_values)?)
    }

    fn update_attack(
        &self,
        creature_name: &str,
        attack_name: &str,
        new_values: &Document,
    ) -> RepoResult<u64> {
        validate_attack_values(new_values)?;

        let filter = expr::and_eq(
            expr::eq(fields::NAME, creature_name),
            &format!("{}.{}", fields::ATTACKS, fields::ATTACK_NAME),
            attack_name,
        );
        let update = expr::positional_set(fields::ATTACKS, new_values);
        Ok(self.conn.apply_update(&self.collection, &filter, &update)?)
    }

    fn delete(&self, filter: &Document) -> RepoResult<u64> {
        Ok(self.conn.delete(&self.collection, filter)?)
    }

    fn delete_attack(&self, creature_name: &str, attack_name: &str) -> RepoResult<u64> {
        let filter = expr::eq(fields::NAME, creature_name);
        let update = expr::pull(
            fields::ATTACKS,
            Value::Object(expr::eq(fields::ATTACK_NAME, attack_name)),
        );
        Ok(self.conn.apply_update(&self.collection, &filter, &update)?)
    }
}

/// Flattens a creature into its stored document shape.
pub fn creature_to_document(creature: &Creature) -> Document {
    let mut document = Document::new();
    document.insert(fields::NAME.to_string(), Value::from(creature.name.as_str()));
    document.insert(
        fields::REGION.to_string(),
        Value::from(creature.region.as_str()),
    );
    document.insert(
        fields::NATIONAL_INDEX.to_string(),
        Value::from(creature.national_index),
    );
    document.insert(
        fields::PRIMARY_TYPE.to_string(),
        Value::from(creature.primary_type.as_str()),
    );
    document.insert(
        fields::SECONDARY_TYPE.to_string(),
        Value::from(creature.secondary_type.as_deref()),
    );
    document.insert(fields::LEVEL.to_string(), Value::from(creature.level));
    document.insert(
        fields::ATTACKS.to_string(),
        Value::Array(creature.attacks.iter().map(attack_to_value).collect()),
    );
    document
}

/// Reconstructs a creature from a stored document.
///
/// # Errors
/// - `InvalidData` when a required field is missing or mistyped, when an
///   attack entry is malformed, or when unknown fields are present.
pub fn creature_from_document(mut document: Document) -> RepoResult<Creature> {
    document.remove(ID_FIELD);

    let name = take_text(&mut document, fields::NAME)?;
    let region = take_text(&mut document, fields::REGION)?;
    let national_index = take_integer(&mut document, fields::NATIONAL_INDEX)?
        .ok_or_else(|| missing_field(fields::NATIONAL_INDEX))?;
    let primary_type = take_text(&mut document, fields::PRIMARY_TYPE)?;
    let secondary_type = take_optional_text(&mut document, fields::SECONDARY_TYPE)?;
    let level = take_integer(&mut document, fields::LEVEL)?.unwrap_or(DEFAULT_LEVEL);

    let attacks = match document.remove(fields::ATTACKS) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(position, item)| attack_from_value(item, position))
            .collect::<RepoResult<Vec<_>>>()?,
        Some(_) => {
            return Err(RepoError::InvalidData(format!(
                "field `{}` must be a list",
                fields::ATTACKS
            )))
        }
    };

    reject_unknown_fields(&document, "creature")?;

    Ok(Creature {
        name,
        region,
        national_index,
        primary_type,
        secondary_type,
        level,
        attacks,
    })
}

fn attack_to_value(attack: &Attack) -> Value {
    let mut entry = Document::new();
    entry.insert(
        fields::ATTACK_NAME.to_string(),
        Value::from(attack.name.as_str()),
    );
    entry.insert(
        fields::ATTACK_TYPE.to_string(),
        Value::from(attack.kind.as_str()),
    );
    Value::Object(entry)
}

fn attack_from_value(value: Value, position: usize) -> RepoResult<Attack> {
    let Value::Object(mut entry) = value else {
        return Err(RepoError::InvalidData(format!(
            "attack #{position} must be a mapping"
        )));
    };

    let name = take_text(&mut entry, fields::ATTACK_NAME)
        .map_err(|err| in_attack(err, position))?;
    let kind = take_text(&mut entry, fields::ATTACK_TYPE)
        .map_err(|err| in_attack(err, position))?;
    reject_unknown_fields(&entry, "attack").map_err(|err| in_attack(err, position))?;

    Ok(Attack { name, kind })
}

fn validate_attack_values(new_values: &Document) -> RepoResult<()> {
    if new_values.is_empty() {
        return Err(RepoError::InvalidData(
            "no attack fields to update".to_string(),
        ));
    }
    for (key, value) in new_values {
        if key != fields::ATTACK_NAME && key != fields::ATTACK_TYPE {
            return Err(RepoError::InvalidData(format!(
                "attacks have no field `{key}`"
            )));
        }
        if !value.is_string() {
            return Err(RepoError::InvalidData(format!(
                "attack field `{key}` must be text"
            )));
        }
    }
    Ok(())
}

fn take_text(document: &mut Document, field: &str) -> RepoResult<String> {
    take_optional_text(document, field)?.ok_or_else(|| missing_field(field))
}

fn take_optional_text(document: &mut Document, field: &str) -> RepoResult<Option<String>> {
    match document.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(RepoError::InvalidData(format!(
            "field `{field}` must be text"
        ))),
    }
}

fn take_integer(document: &mut Document, field: &str) -> RepoResult<Option<i64>> {
    match document.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => integer_from_number(&number)
            .map(Some)
            .ok_or_else(|| RepoError::InvalidData(format!("field `{field}` must be an integer"))),
        Some(_) => Err(RepoError::InvalidData(format!(
            "field `{field}` must be an integer"
        ))),
    }
}

/// Accepts integral floating point values written by loosely typed clients.
fn integer_from_number(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    let value = number.as_f64()?;
    let in_range = value >= i64::MIN as f64 && value <= i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn reject_unknown_fields(document: &Document, record: &str) -> RepoResult<()> {
    match document.keys().next() {
        Some(field) => Err(RepoError::InvalidData(format!(
            "unexpected field `{field}` in {record} document"
        ))),
        None => Ok(()),
    }
}

fn missing_field(field: &str) -> RepoError {
    RepoError::InvalidData(format!("missing required field `{field}`"))
}

fn in_attack(err: RepoError, position: usize) -> RepoError {
    match err {
        RepoError::InvalidData(message) => {
            RepoError::InvalidData(format!("attack #{position}: {message}"))
        }
        other => other,
    }
}
