use std::sync::Mutex;

use tokio::sync::oneshot;

/// Single-assignment cell over a one-shot channel.
///
/// Several racing producers (the probe itself, its timer, socket errors)
/// may call [`settle`](SettleOnce::settle); only the first value reaches the
/// receiver.
pub struct SettleOnce<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> SettleOnce<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Stores `value` if nothing was stored yet. Returns whether this call won.
    pub fn settle(&self, value: T) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(tx) => {
                // The receiver may already be gone; the cell is settled regardless.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}
