use roost_core::ids::{PlaceId, UserId};
use roost_core::model::{PlaceStatus, Role, UserStatus};
use roost_core::repository::{CascadeOutcome, CascadeReasons, PlaceStore, UserStore};
use roost_core::{Error, Result};
use std::sync::Arc;

/// Propagates a status change from an owning entity to its dependents.
///
/// User deactivation cascades: owned places go inactive and the user's
/// pending reservations cancel, all in one store transaction with the
/// triggering write. Paid and cancelled reservations are financial history
/// and are never altered.
///
/// Place deactivation deliberately does NOT cascade: it stops new bookings
/// through the active-place gate but leaves existing reservations alone.
pub struct StatusPropagator {
    users: Arc<dyn UserStore>,
    places: Arc<dyn PlaceStore>,
}

impl StatusPropagator {
    pub fn new(users: Arc<dyn UserStore>, places: Arc<dyn PlaceStore>) -> Self {
        Self { users, places }
    }

    /// Admin status change on a user. Transitions to inactive or banned run
    /// the full cascade; any other transition only touches the user (going
    /// back to active does not resurrect cascaded places or cancelled
    /// reservations, and parking an account in pending cancels nothing).
    pub async fn set_user_status(
        &self,
        id: UserId,
        status: UserStatus,
        reason: Option<&str>,
    ) -> Result<CascadeOutcome> {
        let user = self
            .users
            .get_user(id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;

        if user.role == Role::Admin {
            return Err(Error::InvalidState(
                "cannot modify admin status".to_string(),
            ));
        }

        let user_reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("status updated to {} by admin", status.as_str()));

        if !status.cascades_on_set() {
            self.users.set_user_status(id, status, &user_reason).await?;
            return Ok(CascadeOutcome {
                places_deactivated: 0,
                reservations_cancelled: 0,
            });
        }

        let reasons = CascadeReasons {
            user_reason,
            place_reason: "owner deactivated".to_string(),
            reservation_reason: "account deactivated".to_string(),
        };
        let outcome = self
            .users
            .deactivate_user_cascade(id, status, &reasons)
            .await?;
        tracing::info!(
            user_id = %id,
            status = status.as_str(),
            places = outcome.places_deactivated,
            reservations = outcome.reservations_cancelled,
            "user status cascade applied"
        );
        Ok(outcome)
    }

    /// Admin soft delete: the same cascade with a delete-specific reason.
    pub async fn soft_delete_user(&self, id: UserId) -> Result<CascadeOutcome> {
        let user = self
            .users
            .get_user(id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        if user.role == Role::Admin {
            return Err(Error::InvalidState("cannot delete admin".to_string()));
        }

        let reasons = CascadeReasons {
            user_reason: "user deleted by admin".to_string(),
            place_reason: "owner deactivated".to_string(),
            reservation_reason: "account deactivated".to_string(),
        };
        self.users
            .deactivate_user_cascade(id, UserStatus::Inactive, &reasons)
            .await
    }

    /// Admin status change on a place. No cascade: deactivation
    /// blocks new bookings only, existing paid/pending reservations stand.
    pub async fn set_place_status(
        &self,
        id: PlaceId,
        status: PlaceStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("status updated to {} by admin", status.as_str()));
        if !self.places.set_place_status(id, status, &reason).await? {
            return Err(Error::NotFound(format!("place {id}")));
        }
        tracing::info!(place_id = %id, status = status.as_str(), "place status updated");
        Ok(())
    }
}
