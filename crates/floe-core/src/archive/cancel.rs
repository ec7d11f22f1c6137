use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Single "done" signal shared by every pipeline stage.
///
/// Nothing is ever sent on the channel; cancelling drops the sender, so
/// every blocked `recv`/`select` on the receiver unblocks with a
/// disconnect. Cancelling twice is a no-op.
pub struct CancelToken {
    guard: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            guard: Mutex::new(Some(tx)),
            done: rx,
        }
    }

    /// Signal all stages to stop.
    pub fn cancel(&self) {
        self.guard.lock().unwrap().take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver for use in `select!` arms; disconnects on cancel.
    pub(crate) fn done(&self) -> &Receiver<()> {
        &self.done
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.done().try_recv().is_err());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_and_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unblocks_waiting_receiver() {
        let token = Arc::new(CancelToken::new());
        let waiter = Arc::clone(&token);

        let handle = std::thread::spawn(move || {
            // Blocks until the sender is dropped by cancel().
            waiter.done().recv().unwrap_err();
        });

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        handle.join().unwrap();
    }
}
