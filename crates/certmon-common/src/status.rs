//! Mapping from certificate expiry to a [`DomainStatus`] band.

use chrono::{DateTime, Utc};

use crate::types::DomainStatus;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days until `not_after`, rounded up. A certificate that expired
/// less than a day ago yields `0`, one that expired 1.5 days ago `-1`.
///
/// # Examples
///
/// ```
/// use certmon_common::status::days_remaining;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
/// assert_eq!(days_remaining(now + Duration::days(7), now), 7);
/// assert_eq!(days_remaining(now - Duration::hours(36), now), -1);
/// ```
pub fn days_remaining(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (not_after - now).num_milliseconds();
    // Integer division truncates toward zero, which is already the ceiling
    // for negative values.
    let days = millis / MILLIS_PER_DAY;
    if millis > 0 && millis % MILLIS_PER_DAY != 0 {
        days + 1
    } else {
        days
    }
}

/// Computes the health band for a certificate expiring at `not_after`.
pub fn compute_status(not_after: DateTime<Utc>, now: DateTime<Utc>) -> DomainStatus {
    status_for_days(days_remaining(not_after, now))
}

pub fn status_for_days(days: i64) -> DomainStatus {
    if days < 0 {
        DomainStatus::Expired
    } else if days <= 1 {
        DomainStatus::Expiring1Day
    } else if days <= 7 {
        DomainStatus::Expiring7Days
    } else if days <= 14 {
        DomainStatus::Expiring14Days
    } else if days <= 30 {
        DomainStatus::Expiring30Days
    } else {
        DomainStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn rank(status: DomainStatus) -> u8 {
        match status {
            DomainStatus::Ok => 0,
            DomainStatus::Expiring30Days => 1,
            DomainStatus::Expiring14Days => 2,
            DomainStatus::Expiring7Days => 3,
            DomainStatus::Expiring1Day => 4,
            DomainStatus::Expired => 5,
            DomainStatus::Pending => unreachable!("never computed"),
        }
    }

    #[test]
    fn boundary_table() {
        let cases = [
            (-1, DomainStatus::Expired),
            (0, DomainStatus::Expiring1Day),
            (1, DomainStatus::Expiring1Day),
            (7, DomainStatus::Expiring7Days),
            (8, DomainStatus::Expiring14Days),
            (14, DomainStatus::Expiring14Days),
            (15, DomainStatus::Expiring30Days),
            (30, DomainStatus::Expiring30Days),
            (31, DomainStatus::Ok),
        ];
        for (days, expected) in cases {
            let not_after = now() + Duration::days(days);
            assert_eq!(compute_status(not_after, now()), expected, "days = {days}");
        }
    }

    #[test]
    fn partial_days_round_up() {
        let not_after = now() + Duration::days(30) + Duration::minutes(1);
        assert_eq!(days_remaining(not_after, now()), 31);
        assert_eq!(compute_status(not_after, now()), DomainStatus::Ok);

        let not_after = now() + Duration::days(7) + Duration::seconds(1);
        assert_eq!(compute_status(not_after, now()), DomainStatus::Expiring14Days);
    }

    #[test]
    fn recently_expired_is_still_last_day() {
        let not_after = now() - Duration::hours(12);
        assert_eq!(days_remaining(not_after, now()), 0);
        assert_eq!(compute_status(not_after, now()), DomainStatus::Expiring1Day);

        let not_after = now() - Duration::hours(25);
        assert_eq!(compute_status(not_after, now()), DomainStatus::Expired);
    }

    #[test]
    fn status_never_moves_toward_ok_as_time_passes() {
        let not_after = now() + Duration::days(45);
        let mut previous = rank(compute_status(not_after, now()));
        for hour in 0..(24 * 50) {
            let at = now() + Duration::hours(hour);
            let current = rank(compute_status(not_after, at));
            assert!(current >= previous, "regressed at hour {hour}");
            previous = current;
        }
        assert_eq!(previous, rank(DomainStatus::Expired));
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let not_after = now() + Duration::days(10);
        assert_eq!(
            compute_status(not_after, now()),
            compute_status(not_after, now())
        );
    }
}
