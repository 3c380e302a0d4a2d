use crate::ids::{PlaceId, ReservationId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Status enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceStatus {
    Active,
    Inactive,
    Pending,
    Maintenance,
    Blocked,
}

impl PlaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Maintenance => "maintenance",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "pending" => Ok(Self::Pending),
            "maintenance" => Ok(Self::Maintenance),
            "blocked" => Ok(Self::Blocked),
            other => Err(Error::Validation(format!("invalid place status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Banned => "banned",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "banned" => Ok(Self::Banned),
            "pending" => Ok(Self::Pending),
            other => Err(Error::Validation(format!("invalid user status: {other}"))),
        }
    }

    /// Only inactive and banned tear down the account's footprint; pending
    /// is a verification hold and active is normal operation.
    pub fn cascades_on_set(&self) -> bool {
        matches!(self, Self::Inactive | Self::Banned)
    }
}

/// Exactly three reservation states. The source system's validation lists
/// mention `refunded`/`confirmed`/`completed`, but no code path ever produces
/// them; those tokens are rejected as invalid input here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Paid,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::Validation(format!(
                "invalid reservation status: {other}"
            ))),
        }
    }

    /// Pending and paid reservations block availability; cancelled never does.
    pub fn blocks_availability(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}

// ============================================================================
// Date range
// ============================================================================

/// Inclusive date range at day granularity. Construction rejects inverted
/// ranges, so everything downstream can assume `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Validation(format!(
                "end date {end} precedes start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of billable nights. The range is inclusive on both ends, so a
    /// same-day booking counts as one night.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Closed-interval overlap: `[s,e]` conflicts with `[s',e']` iff
    /// `s <= e' && e >= s'`. Inclusive on both ends by policy: the checkout
    /// day of one guest may not be the check-in day of the next (no same-day
    /// turnover). Blocked-date expansion uses the same policy.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Lazy day-by-day expansion of the range.
    pub fn iter_days(&self) -> DayIter {
        DayIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

pub struct DayIter {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for DayIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = if current < self.end {
            current.checked_add_days(Days::new(1))
        } else {
            None
        };
        Some(current)
    }
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Per-night price in the smallest currency unit (cents).
    pub price: i64,
    pub guest_capacity: i32,
    pub status: PlaceStatus,
    pub status_reason: Option<String>,
    pub status_updated_at: DateTime<Utc>,
    /// Monotonic stats counter, incremented when a reservation is created.
    pub reservation_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(Error::Validation(format!("invalid role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub status_reason: Option<String>,
    pub status_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Who asked for a cancellation; recorded on the reservation for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelActor {
    Guest,
    Admin,
    System,
}

impl CancelActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub place_id: PlaceId,
    pub range: DateRange,
    /// Computed at creation as `price * nights`; immutable after capture.
    pub total_price: i64,
    pub status: ReservationStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub invoice_url: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelActor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new_pending(user_id: UserId, place: &Place, range: DateRange) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            user_id,
            place_id: place.id,
            range,
            total_price: place.price * range.nights(),
            status: ReservationStatus::Pending,
            checkout_session_id: None,
            payment_intent_id: None,
            invoice_url: None,
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(d("2026-06-05"), d("2026-06-01")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn nights_are_inclusive() {
        let range = DateRange::new(d("2026-06-01"), d("2026-06-05")).unwrap();
        assert_eq!(range.nights(), 5);
        let single = DateRange::new(d("2026-06-01"), d("2026-06-01")).unwrap();
        assert_eq!(single.nights(), 1);
    }

    #[test]
    fn overlap_is_inclusive_on_both_ends() {
        let a = DateRange::new(d("2026-06-01"), d("2026-06-05")).unwrap();
        let touching = DateRange::new(d("2026-06-05"), d("2026-06-08")).unwrap();
        // No same-day turnover: a shared boundary day conflicts.
        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));

        let disjoint = DateRange::new(d("2026-06-06"), d("2026-06-08")).unwrap();
        assert!(!a.overlaps(&disjoint));

        let contained = DateRange::new(d("2026-06-03"), d("2026-06-04")).unwrap();
        assert!(a.overlaps(&contained));
    }

    #[test]
    fn iter_days_expands_every_calendar_day() {
        let range = DateRange::new(d("2026-06-01"), d("2026-06-03")).unwrap();
        let days: Vec<NaiveDate> = range.iter_days().collect();
        assert_eq!(days, vec![d("2026-06-01"), d("2026-06-02"), d("2026-06-03")]);
    }

    #[test]
    fn total_price_is_price_times_nights() {
        let place = Place {
            id: PlaceId::new(),
            owner_id: UserId::new(),
            title: "Cabin".into(),
            description: None,
            image_url: None,
            price: 100,
            guest_capacity: 2,
            status: PlaceStatus::Active,
            status_reason: None,
            status_updated_at: Utc::now(),
            reservation_count: 0,
            created_at: Utc::now(),
        };
        let range = DateRange::new(d("2026-06-01"), d("2026-06-05")).unwrap();
        let reservation = Reservation::new_pending(UserId::new(), &place, range);
        assert_eq!(reservation.total_price, 500);
        assert_eq!(reservation.status, ReservationStatus::Pending);
    }

    #[test]
    fn vestigial_status_tokens_are_rejected() {
        for token in ["refunded", "confirmed", "completed"] {
            assert!(ReservationStatus::parse(token).is_err());
        }
    }
}
