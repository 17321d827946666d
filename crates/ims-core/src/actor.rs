// SPDX-License-Identifier: BUSL-1.1
//! Actors and roles.
//!
//! An [`ActorDescriptor`] is the value the identity layer attaches to a
//! request: who is acting, with what role, and whether they hold a temporary
//! rate-limit exemption. The exemption check is a pure predicate over this
//! value so it is unit-testable without any routing infrastructure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles in the IMS stack, ordered by privilege level.
///
/// The `Ord` derivation respects variant declaration order:
/// `Staff < Manager < Admin < SuperAdmin`. This enables `>=` comparison
/// for role-based access checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Day-to-day operations: orders, purchases, stock reads.
    Staff,
    /// Staff plus stock adjustments, transfers, and document deletion.
    Manager,
    /// Manager plus user administration. Exempt from rate limiting.
    Admin,
    /// Full access. Exempt from rate limiting.
    SuperAdmin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::SuperAdmin => "superadmin",
        }
    }

    /// Parse a role string as stored in tokens and database rows.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "staff" => Some(Self::Staff),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            "superadmin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }
}

/// The acting identity attached to a request by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDescriptor {
    pub actor_id: Uuid,
    pub role: Role,
    /// Temporary rate-limit exemption grant. Exempt while strictly in the
    /// future; an elapsed grant has no effect.
    pub rate_limit_exempt_until: Option<DateTime<Utc>>,
}

impl ActorDescriptor {
    /// Whether this actor bypasses rate-limit counting at `now`.
    ///
    /// True for Admin and SuperAdmin roles, and for any actor holding an
    /// unexpired exemption grant.
    pub fn is_rate_limit_exempt(&self, now: DateTime<Utc>) -> bool {
        if self.role >= Role::Admin {
            return true;
        }
        match self.rate_limit_exempt_until {
            Some(until) => until > now,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn actor(role: Role, exempt_until: Option<DateTime<Utc>>) -> ActorDescriptor {
        ActorDescriptor {
            actor_id: Uuid::new_v4(),
            role,
            rate_limit_exempt_until: exempt_until,
        }
    }

    #[test]
    fn role_ordering_is_correct() {
        assert!(Role::Staff < Role::Manager);
        assert!(Role::Manager < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn role_strings_round_trip() {
        for role in [Role::Staff, Role::Manager, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn admin_and_superadmin_are_exempt() {
        let now = Utc::now();
        assert!(actor(Role::Admin, None).is_rate_limit_exempt(now));
        assert!(actor(Role::SuperAdmin, None).is_rate_limit_exempt(now));
    }

    #[test]
    fn staff_without_grant_is_not_exempt() {
        let now = Utc::now();
        assert!(!actor(Role::Staff, None).is_rate_limit_exempt(now));
        assert!(!actor(Role::Manager, None).is_rate_limit_exempt(now));
    }

    #[test]
    fn future_grant_exempts_past_grant_does_not() {
        let now = Utc::now();
        let future = actor(Role::Staff, Some(now + Duration::hours(1)));
        let past = actor(Role::Staff, Some(now - Duration::hours(1)));
        assert!(future.is_rate_limit_exempt(now));
        assert!(!past.is_rate_limit_exempt(now));
    }

    #[test]
    fn grant_expiring_exactly_now_is_not_exempt() {
        let now = Utc::now();
        let edge = actor(Role::Staff, Some(now));
        assert!(!edge.is_rate_limit_exempt(now));
    }
}
