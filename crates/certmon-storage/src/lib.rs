//! Persistence for monitored domains, their owners, the append-only check
//! history, and the notification outbox.
//!
//! [`CertStore`] wraps a SeaORM connection and exposes entity operations.
//! Writes that must land together (a check row plus the domain snapshot it
//! produced, and any notification queued because of it) go through a
//! [`StoreTransaction`] obtained from [`CertStore::begin`].

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};
pub use store::domain::DomainSnapshotUpdate;
pub use store::transaction::StoreTransaction;
pub use store::{CertStore, OutboxFilter};
