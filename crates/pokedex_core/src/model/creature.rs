//! Creature and attack records.
//!
//! # Invariants
//! - An attack always has both `name` and `kind` set.
//! - An empty `attacks` list means "no attacks recorded"; there is no
//!   separate absent state.

use serde::Serialize;

/// Default level for a freshly registered creature.
pub const DEFAULT_LEVEL: i64 = 1;

/// An attack a creature can perform. Identity is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Attack {
    pub name: String,
    /// Element of the attack. Serialized as `type`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Attack {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Primary record of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Creature {
    pub name: String,
    pub region: String,
    /// National pokédex number. Not enforced unique.
    pub national_index: i64,
    pub primary_type: String,
    pub secondary_type: Option<String>,
    pub level: i64,
    pub attacks: Vec<Attack>,
}

impl Creature {
    /// Creates a level 1 creature with a single element and no attacks.
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        national_index: i64,
        primary_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            national_index,
            primary_type: primary_type.into(),
            secondary_type: None,
            level: DEFAULT_LEVEL,
            attacks: Vec::new(),
        }
    }

    pub fn with_secondary_type(mut self, secondary_type: impl Into<String>) -> Self {
        self.secondary_type = Some(secondary_type.into());
        self
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = level;
        self
    }

    pub fn with_attacks(mut self, attacks: impl IntoIterator<Item = Attack>) -> Self {
        self.attacks = attacks.into_iter().collect();
        self
    }

    pub fn with_attack(mut self, attack: Attack) -> Self {
        self.attacks.push(attack);
        self
    }

    /// Returns the first attack with the given name, if any.
    pub fn attack(&self, name: &str) -> Option<&Attack> {
        self.attacks.iter().find(|attack| attack.name == name)
    }

    pub fn has_attacks(&self) -> bool {
        !self.attacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Attack, Creature, DEFAULT_LEVEL};

    #[test]
    fn new_creature_uses_defaults() {
        let creature = Creature::new("Charmander", "Kanto", 4, "Fire");
        assert_eq!(creature.level, DEFAULT_LEVEL);
        assert!(creature.secondary_type.is_none());
        assert!(!creature.has_attacks());
    }

    #[test]
    fn attack_lookup_returns_first_match() {
        let creature = Creature::new("Pikachu", "Kanto", 25, "Electric")
            .with_attack(Attack::new("Quick Attack", "Normal"))
            .with_attack(Attack::new("Thunderbolt", "Electric"));

        assert_eq!(
            creature.attack("Thunderbolt"),
            Some(&Attack::new("Thunderbolt", "Electric"))
        );
        assert!(creature.attack("Surf").is_none());
    }

    #[test]
    fn attack_serializes_kind_as_type() {
        let json = serde_json::to_value(Attack::new("Ember", "Fire")).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Ember", "type": "Fire" }));
    }
}
