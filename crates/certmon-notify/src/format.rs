//! Display helpers shared by the notification templates.

use certmon_common::types::DomainStatus;
use chrono::{DateTime, Utc};

/// Relative expiry phrase for a certificate `days` whole days from expiry.
///
/// ```
/// use certmon_common::types::DomainStatus;
/// use certmon_notify::format::format_expires_in;
///
/// assert_eq!(format_expires_in(12, DomainStatus::Expiring14Days), "in 12 days");
/// assert_eq!(format_expires_in(-3, DomainStatus::Expired), "expired 3 days ago");
/// ```
pub fn format_expires_in(days: i64, status: DomainStatus) -> String {
    if status == DomainStatus::Expired || days < 0 {
        return match -days {
            n if n <= 0 => "expired".to_string(),
            1 => "expired 1 day ago".to_string(),
            n => format!("expired {n} days ago"),
        };
    }
    match days {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        n => format!("in {n} days"),
    }
}

/// Absolute expiry date in UTC, e.g. `March 9, 2026`.
pub fn format_expiration_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// `YYYY-MM-DD` of the report generation time.
pub fn format_generated_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Provider tag for a template, prefixed by environment: `DEV-CERTS-Heartbeat`.
pub fn message_tag(environment: &str, template_name: &str) -> String {
    format!("{}-CERTS-{}", environment.to_uppercase(), template_name)
}

/// Link to the per-user settings page.
pub fn settings_url(website_url: &str, settings_token: &str) -> String {
    format!("{}/?token={}", website_url.trim_end_matches('/'), settings_token)
}
