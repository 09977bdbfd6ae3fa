//! Role/resource permission matrix.
//!
//! Authorization is a pure lookup over an immutable rule table built at
//! startup. Every (role level, resource) pair answers Allow or Deny; a
//! pair the table says nothing about answers Deny. Restriction states
//! (anonymous, pending, banned, deactivated) deny before the table is
//! consulted at all.

use tracing::debug;

use crate::auth::resolver::Principal;
use crate::config::RuleConfig;
use crate::types::RoleLevel;

/// Authorization verdict. Only two values on purpose: there is no
/// "unknown" that a caller could accidentally treat as permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Resource pattern: an exact path, or a prefix written with a trailing `/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResourcePattern {
    Exact(String),
    Prefix(String),
}

impl ResourcePattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/*") {
            Some(prefix) => ResourcePattern::Prefix(format!("{prefix}/")),
            None => ResourcePattern::Exact(pattern.to_string()),
        }
    }

    /// Match strength: `None` for no match, otherwise a specificity used
    /// to break ties. Exact matches outrank every prefix; among prefixes
    /// the longest wins.
    fn specificity(&self, path: &str) -> Option<usize> {
        match self {
            ResourcePattern::Exact(exact) => (exact == path).then(|| usize::MAX),
            ResourcePattern::Prefix(prefix) => {
                // "/admin/*" also covers "/admin" itself.
                (path.starts_with(prefix.as_str()) || path == &prefix[..prefix.len() - 1]).then(|| prefix.len())
            }
        }
    }
}

#[derive(Debug, Clone)]
struct PermissionRule {
    level: RoleLevel,
    pattern: ResourcePattern,
    allow: bool,
}

/// Immutable rule table answering (level, resource) lookups.
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    rules: Vec<PermissionRule>,
}

impl PermissionMatrix {
    pub fn new(rules: &[RuleConfig]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| PermissionRule {
                level: rule.level,
                pattern: ResourcePattern::parse(&rule.pattern),
                allow: rule.allow,
            })
            .collect();
        Self { rules }
    }

    /// The matrix used when configuration supplies no rules.
    ///
    /// Root gets everything. Admin gets the admin area except the system
    /// console, which stays root-only. Editors manage content, members
    /// read and contribute to the public area. Unlisted pairs deny.
    pub fn builtin() -> Self {
        let allow = |level, pattern: &str| RuleConfig {
            level,
            pattern: pattern.to_string(),
            allow: true,
        };
        let deny = |level, pattern: &str| RuleConfig {
            level,
            pattern: pattern.to_string(),
            allow: false,
        };

        Self::new(&[
            allow(RoleLevel::Root, "/*"),
            allow(RoleLevel::Admin, "/*"),
            deny(RoleLevel::Admin, "/admin/system/*"),
            allow(RoleLevel::Editor, "/routes/*"),
            allow(RoleLevel::Editor, "/crags/*"),
            allow(RoleLevel::Editor, "/topos/*"),
            allow(RoleLevel::Editor, "/account/*"),
            allow(RoleLevel::Member, "/routes/*"),
            allow(RoleLevel::Member, "/crags/*"),
            allow(RoleLevel::Member, "/account/*"),
            deny(RoleLevel::Member, "/routes/moderate/*"),
            deny(RoleLevel::Member, "/crags/moderate/*"),
        ])
    }

    /// Build from configuration, falling back to the built-in matrix when
    /// no rules are configured.
    pub fn from_config(rules: &[RuleConfig]) -> Self {
        if rules.is_empty() { Self::builtin() } else { Self::new(rules) }
    }

    /// Answer whether `principal` may touch `resource`.
    ///
    /// Restricted principals deny without a table lookup. Otherwise the
    /// most specific matching rule for the principal's level decides; a
    /// deny rule at equal specificity beats an allow rule; no matching
    /// rule denies.
    pub fn authorize(&self, principal: &Principal, resource: &str) -> Decision {
        if principal.is_restricted() {
            return Decision::Deny;
        }
        let Some(level) = principal.role_level() else {
            return Decision::Deny;
        };

        let mut best: Option<(usize, bool)> = None;
        for rule in self.rules.iter().filter(|r| r.level == level) {
            let Some(specificity) = rule.pattern.specificity(resource) else {
                continue;
            };
            best = match best {
                Some((s, allowed)) if s > specificity => Some((s, allowed)),
                Some((s, allowed)) if s == specificity => Some((s, allowed && rule.allow)),
                _ => Some((specificity, rule.allow)),
            };
        }

        match best {
            Some((_, true)) => Decision::Allow,
            Some((_, false)) => Decision::Deny,
            None => {
                debug!(%level, resource, "no rule matched, denying");
                Decision::Deny
            }
        }
    }
}

/// Ordinal gate independent of the rule table: allow when the principal
/// holds `min` or a more privileged level and is not restricted.
pub fn require_min_level(principal: &Principal, min: RoleLevel) -> Decision {
    if principal.is_restricted() {
        return Decision::Deny;
    }
    match principal.role_level() {
        Some(level) if level.satisfies(min) => Decision::Allow,
        _ => Decision::Deny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::resolver::CurrentUser;
    use crate::test_utils::user_record;

    fn principal(level: RoleLevel) -> Principal {
        Principal::Known(CurrentUser::from(user_record("u@example.com", level, None)))
    }

    #[test]
    fn test_builtin_matrix_grid() {
        let matrix = PermissionMatrix::builtin();

        // (level, resource, expected)
        let grid = [
            (RoleLevel::Root, "/admin/system/flags", Decision::Allow),
            (RoleLevel::Root, "/routes/42", Decision::Allow),
            (RoleLevel::Admin, "/admin/users/7", Decision::Allow),
            (RoleLevel::Admin, "/admin/system/flags", Decision::Deny),
            (RoleLevel::Admin, "/routes/42", Decision::Allow),
            (RoleLevel::Editor, "/routes/42/edit", Decision::Allow),
            (RoleLevel::Editor, "/topos/3", Decision::Allow),
            (RoleLevel::Editor, "/admin/users/7", Decision::Deny),
            (RoleLevel::Member, "/routes/42", Decision::Allow),
            (RoleLevel::Member, "/routes/moderate/42", Decision::Deny),
            (RoleLevel::Member, "/topos/3", Decision::Deny),
            (RoleLevel::Member, "/admin/users/7", Decision::Deny),
        ];

        for (level, resource, expected) in grid {
            assert_eq!(
                matrix.authorize(&principal(level), resource),
                expected,
                "{level} on {resource}"
            );
        }
    }

    #[test]
    fn test_authorize_is_total_and_defaults_to_deny() {
        let matrix = PermissionMatrix::builtin();
        let paths = [
            "/",
            "/weird/unknown",
            "/routes/42",
            "/account/profile",
            "/admin/users/7",
            "/admin/system/flags",
        ];

        // Every (level, path) pair carries an expected decision; restricted
        // levels deny everywhere, unlisted paths only pass the levels
        // holding "/*".
        for level in RoleLevel::ALL {
            for path in paths {
                let expected = if level.is_restricted() {
                    Decision::Deny
                } else {
                    match (level, path) {
                        (RoleLevel::Root, _) => Decision::Allow,
                        (RoleLevel::Admin, "/admin/system/flags") => Decision::Deny,
                        (RoleLevel::Admin, _) => Decision::Allow,
                        (RoleLevel::Editor | RoleLevel::Member, "/routes/42" | "/account/profile") => Decision::Allow,
                        _ => Decision::Deny,
                    }
                };
                assert_eq!(matrix.authorize(&principal(level), path), expected, "{level} on {path}");
            }
        }
    }

    #[test]
    fn test_banned_flag_overrides_root_level() {
        let matrix = PermissionMatrix::builtin();
        let mut user = user_record("root@example.com", RoleLevel::Root, None);
        user.is_banned = true;
        let principal = Principal::Known(CurrentUser::from(user));
        assert_eq!(matrix.authorize(&principal, "/admin"), Decision::Deny);
    }

    #[test]
    fn test_restricted_levels_always_deny() {
        let matrix = PermissionMatrix::builtin();
        for resource in ["/routes/42", "/account/profile", "/admin/users/7"] {
            assert_eq!(matrix.authorize(&principal(RoleLevel::Pending), resource), Decision::Deny);
            assert_eq!(matrix.authorize(&principal(RoleLevel::Banned), resource), Decision::Deny);
            assert_eq!(matrix.authorize(&Principal::Anonymous, resource), Decision::Deny);
        }
    }

    #[test]
    fn test_inactive_account_denies_despite_level() {
        let matrix = PermissionMatrix::builtin();
        let mut user = user_record("root@example.com", RoleLevel::Root, None);
        user.is_active = false;
        let principal = Principal::Known(CurrentUser::from(user));
        assert_eq!(matrix.authorize(&principal, "/routes/42"), Decision::Deny);
    }

    #[test]
    fn test_unlisted_pair_denies() {
        let matrix = PermissionMatrix::new(&[RuleConfig {
            level: RoleLevel::Member,
            pattern: "/routes/*".to_string(),
            allow: true,
        }]);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Member), "/topos/1"), Decision::Deny);
        // A level with no rules at all denies everywhere.
        assert_eq!(matrix.authorize(&principal(RoleLevel::Editor), "/routes/1"), Decision::Deny);
    }

    #[test]
    fn test_exact_beats_prefix() {
        let matrix = PermissionMatrix::new(&[
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/*".to_string(),
                allow: true,
            },
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/locked".to_string(),
                allow: false,
            },
        ]);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Member), "/routes/open"), Decision::Allow);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Member), "/routes/locked"), Decision::Deny);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let matrix = PermissionMatrix::new(&[
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/*".to_string(),
                allow: true,
            },
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/archive/*".to_string(),
                allow: false,
            },
        ]);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Member), "/routes/42"), Decision::Allow);
        assert_eq!(
            matrix.authorize(&principal(RoleLevel::Member), "/routes/archive/42"),
            Decision::Deny
        );
        // The prefix also covers its own base path.
        assert_eq!(
            matrix.authorize(&principal(RoleLevel::Member), "/routes/archive"),
            Decision::Deny
        );
    }

    #[test]
    fn test_deny_wins_ties() {
        let matrix = PermissionMatrix::new(&[
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/*".to_string(),
                allow: true,
            },
            RuleConfig {
                level: RoleLevel::Member,
                pattern: "/routes/*".to_string(),
                allow: false,
            },
        ]);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Member), "/routes/42"), Decision::Deny);
    }

    #[test]
    fn test_from_config_falls_back_to_builtin() {
        let matrix = PermissionMatrix::from_config(&[]);
        assert_eq!(matrix.authorize(&principal(RoleLevel::Root), "/anything"), Decision::Allow);
    }

    #[test]
    fn test_require_min_level() {
        assert_eq!(require_min_level(&principal(RoleLevel::Admin), RoleLevel::Editor), Decision::Allow);
        assert_eq!(require_min_level(&principal(RoleLevel::Editor), RoleLevel::Editor), Decision::Allow);
        assert_eq!(require_min_level(&principal(RoleLevel::Member), RoleLevel::Editor), Decision::Deny);
        assert_eq!(require_min_level(&principal(RoleLevel::Pending), RoleLevel::Member), Decision::Deny);
        assert_eq!(require_min_level(&Principal::Anonymous, RoleLevel::Member), Decision::Deny);
    }
}
