//! Persistent storage for the pipeline.
//!
//! [`Store`] is the single transactional API over every entity; all other
//! components either read copies out of it or push writes through it.
//! Mutations the pipeline requires to be atomic (event + actor upsert,
//! admin mutation + audit record) are single transactions here.

pub mod database;
pub mod models;

mod store;

mod actors;
mod alerts;
mod audit;
mod baselines;
mod events;
mod rules;
mod scores;
mod sources;

pub use database::DatabasePool;
pub use models::*;
pub use store::Store;
