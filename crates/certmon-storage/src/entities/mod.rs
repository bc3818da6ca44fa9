pub mod check;
pub mod domain;
pub mod outbox_job;
pub mod user;
