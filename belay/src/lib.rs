//! # belay: Authentication & Authorization for Cragbase
//!
//! `belay` is the authentication and authorization subsystem of the
//! Cragbase climbing platform. The platform's content side (regions,
//! sectors, routes, topos, uploads) lives elsewhere; this crate answers
//! the two questions every request raises before any of that content is
//! touched: *who is acting* and *may they do this*.
//!
//! ## Overview
//!
//! The host application mounts `belay` as a library. It owns the session
//! transport (cookies, backing store) and exposes it through the
//! [`session::Session`] trait; everything else is handled here:
//!
//! - **Identity resolution** ([`auth::resolver`]): the session stores only
//!   a principal id. Each resolution re-checks the id against the
//!   credential store, so deactivated, banned or deleted accounts lose
//!   their sessions on their next request, and stale session keys are
//!   purged on the spot. The result is always a concrete
//!   [`auth::Principal`], with anonymous visitors as a first-class value
//!   rather than an absent one.
//! - **Credential lifecycles** ([`auth::service`]): login with Argon2id
//!   verification, fixed-window throttling and enumeration-safe uniform
//!   failures; logout; single-use password reset tokens stored only as
//!   digests; rotating remember-me pairs with theft detection that revokes
//!   a principal's whole token family on replay.
//! - **Authorization** ([`auth::matrix`]): an immutable role/resource
//!   permission matrix built at startup, consulted by the
//!   [`auth::middleware`] gate before dispatch. Every lookup is total and
//!   unlisted pairs deny, so forgetting a rule locks a resource rather
//!   than exposing it.
//! - **Request forgery defense** ([`auth::csrf`]): a session-bound token
//!   validated in constant time and rotated on every privilege change.
//!
//! Privilege tiers are the ordinal [`RoleLevel`] (lower value, more
//! privilege), with pending and banned as restriction states that
//! override ordinal comparisons everywhere.
//!
//! Expected failures (wrong password, expired token, denied access) are
//! [`Rejection`] values with uniform user-facing messages; only
//! infrastructure trouble becomes an [`Error`]. The dispatch gate treats
//! any error during authorization as a deny.
//!
//! ## Persistence
//!
//! PostgreSQL via `sqlx`, behind the [`db::CredentialStore`] and
//! [`db::ThrottleStore`] protocols. [`run_migrations`] applies the
//! bundled schema. In-memory implementations in [`test_utils`] back the
//! test suite and embedded use.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod limits;
pub mod notify;
pub mod session;
pub mod test_utils;
mod types;

pub use config::Config;
pub use errors::{Error, Outcome, Rejection, Result};
pub use types::{InvalidRoleLevel, RememberTokenId, RoleLevel, UserId, abbrev_uuid};

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| anyhow::anyhow!(e).into())
}
