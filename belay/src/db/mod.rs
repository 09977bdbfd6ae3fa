//! Persistence layer: store protocols, Postgres implementations and the
//! database error taxonomy.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;

pub use store::{CredentialStore, ThrottleStore};
