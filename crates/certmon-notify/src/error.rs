/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use certmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Mail transport configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid mail configuration: {0}")]
    InvalidConfig(String),

    /// A sender or recipient address could not be parsed.
    #[error("Notify: invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The message could not be assembled.
    #[error("Notify: failed to build message: {0}")]
    MessageBuild(String),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// Rendering a notification template failed.
    #[error("Notify: template rendering error: {0}")]
    TemplateError(String),

    /// JSON serialization of template data failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
