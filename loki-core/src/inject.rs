//! Module-facing side of the injection path
//!
//! Each module gets an [`InjectorHandle`] wrapping a single-slot mailbox. A
//! send overwrites whatever the writer thread has not drained yet, so
//! producers pace themselves with [`SEND_PACING`] between frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::Result;

/// Pause producers take after each send to give the writer a chance to drain
pub const SEND_PACING: Duration = Duration::from_millis(1);

/// The shared cell between one producer handle and the writer thread
pub type InjectionSlot = Arc<Mutex<Option<Bytes>>>;

/// Handle used by a module to queue a forged frame for transmission
#[derive(Debug, Clone)]
pub struct InjectorHandle {
    owner: Arc<str>,
    slot: InjectionSlot,
}

impl InjectorHandle {
    pub fn new(owner: &str) -> Self {
        Self::with_slot(owner, Arc::new(Mutex::new(None)))
    }

    pub fn with_slot(owner: &str, slot: InjectionSlot) -> Self {
        Self {
            owner: Arc::from(owner),
            slot,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The slot this handle writes into
    pub fn slot(&self) -> InjectionSlot {
        Arc::clone(&self.slot)
    }

    /// Store a frame, replacing any frame not yet drained
    pub fn send(&self, frame: impl Into<Bytes>) {
        let previous = self.slot.lock().replace(frame.into());
        if previous.is_some() {
            trace!(module = %self.owner, "overwrote undrained frame");
        }
    }

    /// Send the outcome of a render step; failures are logged and dropped
    pub fn send_rendered(&self, rendered: Result<Vec<u8>>) -> bool {
        match rendered {
            Ok(frame) => {
                self.send(frame);
                true
            }
            Err(e) => {
                warn!(module = %self.owner, error = %e, "dropping frame that failed to render");
                false
            }
        }
    }

    /// Remove and return the pending frame
    pub fn take(&self) -> Option<Bytes> {
        self.slot.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_last_write_wins() {
        let handle = InjectorHandle::new("test");
        handle.send(vec![1u8]);
        handle.send(vec![2u8]);
        assert_eq!(handle.take().as_deref(), Some(&[2u8][..]));
        assert!(handle.take().is_none());
    }

    #[test]
    fn test_render_failure_is_dropped() {
        let handle = InjectorHandle::new("test");
        assert!(!handle.send_rendered(Err(Error::construction("missing field"))));
        assert!(!handle.is_pending());
        assert!(handle.send_rendered(Ok(vec![0xaa])));
        assert!(handle.is_pending());
    }

    #[test]
    fn test_clones_share_slot() {
        let handle = InjectorHandle::new("test");
        let other = handle.clone();
        other.send(vec![7u8]);
        assert_eq!(handle.take().as_deref(), Some(&[7u8][..]));
    }
}
