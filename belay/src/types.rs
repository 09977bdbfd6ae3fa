//! Common type definitions for the auth subsystem.
//!
//! This module defines:
//! - Type aliases for entity IDs
//! - The [`RoleLevel`] ordinal privilege tier
//!
//! # Role levels
//!
//! Privilege tiers are a small ordinal where **lower value = more
//! privileged**. Two tiers are restriction states rather than privilege
//! grades: [`RoleLevel::Pending`] (unverified account) and
//! [`RoleLevel::Banned`]. Restriction states override ordinal comparisons
//! everywhere: a pending or banned account never satisfies a minimum-level
//! check, no matter how the ordinals compare.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type RememberTokenId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Ordinal privilege tier for a principal.
///
/// The derived `Ord` follows the ordinal, so `Root < Admin < ... < Banned`.
/// Minimum-level checks therefore read `level <= min`, guarded by
/// [`RoleLevel::is_restricted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum RoleLevel {
    /// Full platform control, including system administration.
    Root = 0,
    /// User and content administration.
    Admin = 1,
    /// Content editing for regions, sectors and routes.
    Editor = 2,
    /// Regular verified account.
    Member = 3,
    /// Registered but unverified. Restriction state.
    Pending = 4,
    /// Banned. Restriction state.
    Banned = 5,
}

impl RoleLevel {
    /// Restriction states override any ordinal comparison.
    pub fn is_restricted(self) -> bool {
        matches!(self, RoleLevel::Pending | RoleLevel::Banned)
    }

    /// Whether this level satisfies a minimum-level requirement.
    ///
    /// Lower ordinal = more privileged, so the comparison direction is
    /// `self <= min`. Restricted levels never satisfy any requirement.
    pub fn satisfies(self, min: RoleLevel) -> bool {
        !self.is_restricted() && self <= min
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// All levels, in ordinal order. Used by exhaustive authorization tests.
    pub const ALL: [RoleLevel; 6] = [
        RoleLevel::Root,
        RoleLevel::Admin,
        RoleLevel::Editor,
        RoleLevel::Member,
        RoleLevel::Pending,
        RoleLevel::Banned,
    ];
}

impl std::fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoleLevel::Root => "root",
            RoleLevel::Admin => "admin",
            RoleLevel::Editor => "editor",
            RoleLevel::Member => "member",
            RoleLevel::Pending => "pending",
            RoleLevel::Banned => "banned",
        };
        f.write_str(name)
    }
}

impl TryFrom<i16> for RoleLevel {
    type Error = InvalidRoleLevel;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoleLevel::Root),
            1 => Ok(RoleLevel::Admin),
            2 => Ok(RoleLevel::Editor),
            3 => Ok(RoleLevel::Member),
            4 => Ok(RoleLevel::Pending),
            5 => Ok(RoleLevel::Banned),
            other => Err(InvalidRoleLevel(other)),
        }
    }
}

/// A role ordinal outside the 0..=5 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid role level {0}, expected 0..=5")]
pub struct InvalidRoleLevel(pub i16);
