use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Single-assignment result slot
///
/// Any number of clones may try to complete it, only the first one wins.
/// The waiting side holds the matching [`oneshot::Receiver`].
pub struct ResultSlot<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> ResultSlot<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns `false` if the slot was completed before
    pub fn complete(&self, value: T) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                // a dropped receiver still counts as completed
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }
}
