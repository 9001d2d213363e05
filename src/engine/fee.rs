//! Duration and fee arithmetic. Everything here is pure: the same inputs
//! always produce the same figures and nothing is persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::error::EngineError;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
const MILLIS_PER_MINUTE: i64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeEstimate {
    pub elapsed_minutes: i64,
    pub duration_hours: i64,
    pub duration_minutes: i64,
    pub billed_hours: i64,
    pub estimated_fee: Decimal,
}

/// Billed hours times price left the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fee for {billed_hours} hour(s) at {hourly_price} per hour is out of range")]
pub struct FeeOverflow {
    pub billed_hours: i64,
    pub hourly_price: Decimal,
}

impl FeeOverflow {
    pub fn for_ticket(self, ticket_id: Uuid) -> EngineError {
        EngineError::InvalidTicketState {
            ticket_id,
            reason: self.to_string(),
        }
    }
}

impl FeeEstimate {
    pub fn duration_label(&self) -> String {
        format_duration(self.elapsed_minutes)
    }
}

/// Live estimate for a ticket that entered at `entry`, priced at the
/// ticket's snapshot `hourly_price`. A future entry counts as zero elapsed.
pub fn estimate(
    entry: DateTime<Utc>,
    now: DateTime<Utc>,
    hourly_price: Decimal,
) -> Result<FeeEstimate, FeeOverflow> {
    let elapsed_ms = elapsed_millis(entry, now);
    let elapsed_minutes = elapsed_ms / MILLIS_PER_MINUTE;
    let billed = ceil_hours(elapsed_ms);

    Ok(FeeEstimate {
        elapsed_minutes,
        duration_hours: elapsed_minutes / 60,
        duration_minutes: elapsed_minutes % 60,
        billed_hours: billed,
        estimated_fee: charge(billed, hourly_price)?,
    })
}

/// Whole hours charged between `entry` and `exit`; any started hour counts.
pub fn billed_hours(entry: DateTime<Utc>, exit: DateTime<Utc>) -> i64 {
    ceil_hours(elapsed_millis(entry, exit))
}

pub fn final_amount(
    entry: DateTime<Utc>,
    exit: DateTime<Utc>,
    hourly_price: Decimal,
) -> Result<Decimal, FeeOverflow> {
    charge(billed_hours(entry, exit), hourly_price)
}

fn charge(billed_hours: i64, hourly_price: Decimal) -> Result<Decimal, FeeOverflow> {
    Decimal::from(billed_hours)
        .checked_mul(hourly_price)
        .ok_or(FeeOverflow {
            billed_hours,
            hourly_price,
        })
}

/// Amount stored on a freshly opened ticket: one hour.
pub fn initial_amount(hourly_price: Decimal) -> Decimal {
    hourly_price
}

pub fn format_duration(elapsed_minutes: i64) -> String {
    let hours = elapsed_minutes / 60;
    let minutes = elapsed_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "just now".to_string()
    }
}

fn elapsed_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().max(0)
}

fn ceil_hours(millis: i64) -> i64 {
    (millis + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn ninety_minutes_bills_two_hours() {
        let est = estimate(t0(), t0() + Duration::minutes(90), Decimal::from(15000)).unwrap();
        assert_eq!(est.elapsed_minutes, 90);
        assert_eq!(est.duration_hours, 1);
        assert_eq!(est.duration_minutes, 30);
        assert_eq!(est.billed_hours, 2);
        assert_eq!(est.estimated_fee, Decimal::from(30000));
    }

    #[test]
    fn any_started_hour_is_billed() {
        let price = Decimal::from(10000);
        assert_eq!(billed_hours(t0(), t0() + Duration::milliseconds(1)), 1);
        assert_eq!(billed_hours(t0(), t0() + Duration::hours(1)), 1);
        assert_eq!(billed_hours(t0(), t0() + Duration::hours(1) + Duration::seconds(1)), 2);
        assert_eq!(
            final_amount(t0(), t0() + Duration::minutes(135), price).unwrap(),
            Decimal::from(30000)
        );
    }

    #[test]
    fn exit_equal_to_entry_bills_nothing() {
        assert_eq!(billed_hours(t0(), t0()), 0);
        let est = estimate(t0(), t0(), Decimal::from(5000)).unwrap();
        assert_eq!(est.estimated_fee, Decimal::ZERO);
        assert_eq!(est.duration_label(), "just now");
    }

    #[test]
    fn future_entry_is_clamped_to_zero() {
        let est = estimate(t0() + Duration::minutes(5), t0(), Decimal::from(5000)).unwrap();
        assert_eq!(est.elapsed_minutes, 0);
        assert_eq!(est.billed_hours, 0);
    }

    #[test]
    fn estimate_is_repeatable() {
        let now = t0() + Duration::minutes(61);
        let first = estimate(t0(), now, Decimal::from(7000)).unwrap();
        for _ in 0..1000 {
            assert_eq!(estimate(t0(), now, Decimal::from(7000)).unwrap(), first);
        }
    }

    #[test]
    fn billing_matches_ceiling_formula_for_many_pairs() {
        let price = Decimal::from(15000);
        for minutes in 0..600i64 {
            let exit = t0() + Duration::minutes(minutes);
            let expected = (minutes + 59) / 60;
            assert_eq!(billed_hours(t0(), exit), expected);
            assert_eq!(
                final_amount(t0(), exit, price).unwrap(),
                Decimal::from(expected) * price
            );
        }
    }

    #[test]
    fn oversized_fee_is_an_error_not_a_panic() {
        let exit = t0() + Duration::minutes(90);
        let err = final_amount(t0(), exit, Decimal::MAX).unwrap_err();
        assert_eq!(err.billed_hours, 2);
        assert!(estimate(t0(), exit, Decimal::MAX).is_err());

        // One hour at the largest price still fits.
        let exit = t0() + Duration::minutes(30);
        assert_eq!(final_amount(t0(), exit, Decimal::MAX).unwrap(), Decimal::MAX);

        let ticket_id = Uuid::nil();
        assert!(matches!(
            err.for_ticket(ticket_id),
            EngineError::InvalidTicketState { .. }
        ));
    }

    #[test]
    fn duration_labels() {
        assert_eq!(format_duration(135), "2h 15m");
        assert_eq!(format_duration(15), "15m");
        assert_eq!(format_duration(60), "1h 0m");
    }
}
