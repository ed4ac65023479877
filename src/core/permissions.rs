//! Who may change what.
//!
//! Purchases can be edited or deleted by their creator or an admin, and become
//! read-only for non-admins once settled. Contributions are admin-only after creation.
//! Meter readings can be removed by whoever took them or an admin.

use crate::{
    entities::{meter_reading, token_purchase, user_contribution},
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};

/// The user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User id
    pub user_id: String,
    /// Whether the user has admin rights
    pub is_admin: bool,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub fn new(user_id: impl Into<String>, is_admin: bool) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin,
        }
    }

    /// Regular user without admin rights.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, false)
    }

    /// User with admin rights.
    #[must_use]
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, true)
    }

    /// Whether the actor may act on behalf of `user_id`.
    #[must_use]
    pub fn acts_for(&self, user_id: &str) -> bool {
        self.is_admin || self.user_id == user_id
    }
}

/// Ensures `actor` may edit or delete `purchase`.
pub fn ensure_can_modify_purchase(
    actor: &Actor,
    purchase: &token_purchase::Model,
    settled: bool,
) -> Result<()> {
    if actor.is_admin {
        return Ok(());
    }
    if purchase.creator_id != actor.user_id {
        return Err(Error::Forbidden {
            message: format!(
                "Only the creator or an admin can modify purchase {}",
                purchase.id
            ),
        });
    }
    if settled {
        return Err(Error::PurchaseLocked { id: purchase.id });
    }
    Ok(())
}

/// Ensures `actor` may edit or delete `contribution`.
pub fn ensure_can_modify_contribution(
    actor: &Actor,
    contribution: &user_contribution::Model,
) -> Result<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(Error::Forbidden {
            message: format!("Only an admin can modify contribution {}", contribution.id),
        })
    }
}

/// Ensures `actor` may delete `reading`.
pub fn ensure_can_modify_meter_reading(actor: &Actor, reading: &meter_reading::Model) -> Result<()> {
    if actor.acts_for(&reading.user_id) {
        Ok(())
    } else {
        Err(Error::Forbidden {
            message: format!(
                "Only the author or an admin can modify meter reading {}",
                reading.id
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{contribution_model, day, purchase_model};

    fn purchase_by(creator: &str) -> token_purchase::Model {
        let mut purchase = purchase_model(3, day(2024, 1, 1), 100.0, 50.0, 0.0);
        purchase.creator_id = creator.to_string();
        purchase
    }

    #[test]
    fn test_creator_can_modify_unsettled_purchase() {
        let purchase = purchase_by("alice");
        assert!(ensure_can_modify_purchase(&Actor::user("alice"), &purchase, false).is_ok());
    }

    #[test]
    fn test_other_user_cannot_modify_purchase() {
        let purchase = purchase_by("alice");
        let result = ensure_can_modify_purchase(&Actor::user("bob"), &purchase, false);
        assert!(matches!(result, Err(Error::Forbidden { .. })));
    }

    #[test]
    fn test_settled_purchase_is_locked_for_creator() {
        let purchase = purchase_by("alice");
        let result = ensure_can_modify_purchase(&Actor::user("alice"), &purchase, true);
        assert!(matches!(result, Err(Error::PurchaseLocked { id: 3 })));
    }

    #[test]
    fn test_admin_can_modify_settled_purchase() {
        let purchase = purchase_by("alice");
        assert!(ensure_can_modify_purchase(&Actor::admin("root"), &purchase, true).is_ok());
    }

    #[test]
    fn test_contributions_are_admin_only() {
        let contribution = contribution_model(1, 1, "alice", 10.0, 5.0);
        assert!(ensure_can_modify_contribution(&Actor::admin("root"), &contribution).is_ok());
        assert!(matches!(
            ensure_can_modify_contribution(&Actor::user("alice"), &contribution),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn test_acts_for() {
        assert!(Actor::user("alice").acts_for("alice"));
        assert!(!Actor::user("alice").acts_for("bob"));
        assert!(Actor::admin("root").acts_for("bob"));
    }
}
