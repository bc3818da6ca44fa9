use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Certificate health band of a monitored domain.
///
/// `Pending` is only ever the initial value of a domain that has not had a
/// successful check yet; every other band is derived from the certificate's
/// `not_after` by [`crate::status::compute_status`].
///
/// # Examples
///
/// ```
/// use certmon_common::types::DomainStatus;
///
/// let status: DomainStatus = "EXPIRING_7DAYS".parse().unwrap();
/// assert_eq!(status, DomainStatus::Expiring7Days);
/// assert_eq!(status.to_string(), "EXPIRING_7DAYS");
/// assert!(status.is_notifiable());
/// assert!(!DomainStatus::Ok.is_notifiable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Pending,
    Ok,
    #[serde(rename = "EXPIRING_30DAYS")]
    Expiring30Days,
    #[serde(rename = "EXPIRING_14DAYS")]
    Expiring14Days,
    #[serde(rename = "EXPIRING_7DAYS")]
    Expiring7Days,
    #[serde(rename = "EXPIRING_1DAY")]
    Expiring1Day,
    Expired,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "PENDING",
            DomainStatus::Ok => "OK",
            DomainStatus::Expiring30Days => "EXPIRING_30DAYS",
            DomainStatus::Expiring14Days => "EXPIRING_14DAYS",
            DomainStatus::Expiring7Days => "EXPIRING_7DAYS",
            DomainStatus::Expiring1Day => "EXPIRING_1DAY",
            DomainStatus::Expired => "EXPIRED",
        }
    }

    /// Whether entering this band should alert the domain owner.
    pub fn is_notifiable(&self) -> bool {
        matches!(
            self,
            DomainStatus::Expiring30Days
                | DomainStatus::Expiring14Days
                | DomainStatus::Expiring7Days
                | DomainStatus::Expiring1Day
                | DomainStatus::Expired
        )
    }

    /// Bands shown in the "critical" section of reports.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            DomainStatus::Expired | DomainStatus::Expiring1Day | DomainStatus::Expiring7Days
        )
    }

    /// Bands shown in the "warning" section of reports.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            DomainStatus::Expiring14Days | DomainStatus::Expiring30Days
        )
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(DomainStatus::Pending),
            "OK" => Ok(DomainStatus::Ok),
            "EXPIRING_30DAYS" => Ok(DomainStatus::Expiring30Days),
            "EXPIRING_14DAYS" => Ok(DomainStatus::Expiring14Days),
            "EXPIRING_7DAYS" => Ok(DomainStatus::Expiring7Days),
            "EXPIRING_1DAY" => Ok(DomainStatus::Expiring1Day),
            "EXPIRED" => Ok(DomainStatus::Expired),
            _ => Err(format!("unknown domain status: {s}")),
        }
    }
}

/// Delivery priority of an outbox job. Lower value is sent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutboxPriority {
    High,
    Medium,
    Low,
}

impl OutboxPriority {
    pub fn value(&self) -> i32 {
        match self {
            OutboxPriority::High => 0,
            OutboxPriority::Medium => 5,
            OutboxPriority::Low => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Completed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "Pending",
            OutboxStatus::Completed => "Completed",
            OutboxStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OutboxStatus::Pending),
            "Completed" => Ok(OutboxStatus::Completed),
            "Failed" => Ok(OutboxStatus::Failed),
            _ => Err(format!("unknown outbox status: {s}")),
        }
    }
}

/// Metadata read from the leaf certificate a server presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Issuer organization, falling back to the issuer common name.
    pub issuer: Option<String>,
    /// Subject common name.
    pub cn: Option<String>,
    /// DNS entries of the subject alternative name extension.
    pub san: Vec<String>,
    pub serial: Option<String>,
    /// Colon-separated upper-case SHA-256 of the DER encoding.
    pub fingerprint: Option<String>,
    /// Remote address the probe actually connected to.
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub confirmed: bool,
    pub settings_token: String,
    pub send_heartbeat_report: bool,
    pub last_heartbeat_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub confirmed: bool,
    pub settings_token: String,
    pub send_heartbeat_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub port: u16,
    pub confirmed: bool,
    pub status: DomainStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub cn: Option<String>,
    pub san: Vec<String>,
    pub serial: Option<String>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub error: Option<String>,
    pub error_started_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub last_cert_change_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDomain {
    pub user_id: String,
    pub name: String,
    /// Defaults to 443.
    pub port: Option<u16>,
    pub confirmed: bool,
}

/// A confirmed domain selected for checking, together with its owner.
#[derive(Debug, Clone)]
pub struct DueDomain {
    pub domain: DomainRecord,
    pub owner: UserRecord,
}

/// One historical probe outcome. Either `error` is set or the certificate
/// fields are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub id: String,
    pub domain_id: String,
    pub checked_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub cn: Option<String>,
    pub san: Vec<String>,
    pub serial: Option<String>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Success(CertificateInfo),
    Failure(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxJob {
    pub id: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub priority: i32,
    pub status: OutboxStatus,
    pub failed_attempts: i32,
    pub send_after: Option<DateTime<Utc>>,
    pub retry_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxJob {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub priority: OutboxPriority,
    pub send_after: Option<DateTime<Utc>>,
}
