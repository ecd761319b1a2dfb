//! Repository layer over the store connection.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep document shape details away from callers.
//!
//! # Invariants
//! - Repository reads return typed records or a semantic `InvalidData`
//!   error, never partially decoded values.

pub mod creature_repo;
