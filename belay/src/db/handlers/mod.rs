//! Postgres-backed store implementations.

pub mod throttle;
pub mod users;

pub use throttle::PgThrottleStore;
pub use users::PgCredentialStore;
