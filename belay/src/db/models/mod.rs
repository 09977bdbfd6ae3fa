//! Row structs and request types for the persistence layer.

pub mod tokens;
pub mod users;
