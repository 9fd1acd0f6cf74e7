//! Live queries over the roster store.
//!
//! # Submodules
//!
//! - [`query`] - Value-typed fetch descriptions
//! - [`bridge`] - One-shot loads and change-only subscriptions
//! - [`shared`] - Bound state kept in sync by a subscription

pub mod bridge;
pub mod query;
pub mod shared;

pub use bridge::{ObservationBridge, Subscription};
pub use query::{PeopleQuery, Query};
pub use shared::SharedReader;
