//! Domain model for composite content and learner catalogs.
//!
//! # Responsibility
//! - Define composite trees (surveys, assessments) and their validation.
//! - Define the flattened elements view used by editing UIs.
//! - Define assignments, progress and catalog read models.
//!
//! # Invariants
//! - Every content item is identified by a stable UUID.
//! - Pure functions in this module never touch storage.

pub mod assignment;
pub mod catalog;
pub mod composite;
pub mod content;
pub mod element;
