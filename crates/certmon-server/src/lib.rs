pub mod cert;
pub mod config;
pub mod heartbeat;
pub mod outbox;
pub mod scheduler;
pub mod worker;
