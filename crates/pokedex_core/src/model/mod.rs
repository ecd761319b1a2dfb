//! Domain model for creatures and their attacks.
//!
//! # Invariants
//! - Records carry no store identity; `_id` never reaches this layer.
//! - Element/type values are freeform text.

pub mod creature;
