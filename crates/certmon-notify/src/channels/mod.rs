pub mod log;
pub mod smtp;

pub use self::log::LogMailer;
pub use self::smtp::{SmtpMailer, SmtpSecurity};
