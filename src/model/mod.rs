//! Data models for Roster.
//!
//! This module contains the domain models:
//! - Person (the persisted record)
//! - House
//! - IdentifiedVec (identity-keyed fetch results)

pub mod identified;
pub mod person;

pub use identified::IdentifiedVec;
pub use person::{House, Person};
