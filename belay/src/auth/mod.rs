//! Authentication and authorization components.
//!
//! - [`password`]: Argon2id hashing and token minting
//! - [`resolver`]: session state to [`resolver::Principal`]
//! - [`service`]: login, logout, reset and remember-me lifecycles
//! - [`csrf`]: session-bound CSRF tokens
//! - [`matrix`]: role/resource permission matrix
//! - [`middleware`]: the authorize-before-dispatch gate

pub mod csrf;
pub mod matrix;
pub mod middleware;
pub mod password;
pub mod resolver;
pub mod service;

pub use csrf::CsrfManager;
pub use matrix::{Decision, PermissionMatrix, require_min_level};
pub use middleware::{GateState, authorize_middleware};
pub use resolver::{Auth, CurrentUser, Principal};
pub use service::{AuthService, LoginOutcome, RememberedLogin};
