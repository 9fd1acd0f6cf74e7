//! Roster - SQLite-backed records with live, change-only query subscriptions
//!
//! This crate keeps application state in sync with a SQLite store. State is
//! declared as the result of a typed [`Query`](observation::Query); an
//! [`ObservationBridge`](observation::ObservationBridge) loads it once and
//! then re-runs the query after every committed write, delivering only
//! results that actually changed.
//!
//! # Architecture
//!
//! - [`storage`] - Access coordinator, migrations, records
//! - [`observation`] - Queries, bridges, bound state
//! - [`model`] - Data types (Person, House, IdentifiedVec)
//! - [`feature`] - Intents mapped onto writes
//! - [`config`] - Database location and tuning
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod feature;
pub mod model;
pub mod observation;
pub mod storage;

pub use error::{Error, Result};
