mod error;
mod future;
mod session;

pub use error::{CaptureError, ErrorKind};
pub use future::{CapturedFuture, Outcome};
pub use session::Captured;

use gated_capture_utils::{Gate, GateError, Handle, RwGate, Source};
use log::{debug, trace};
use std::fmt;
use std::sync::Arc;

/// Captures the next value of `source`, one capture at a time.
///
/// The shared gate is the one producers of `source` take (shared) before
/// emitting; a capture holds it exclusively while subscribing and again
/// while finalizing, pausing production around both. A private gate makes
/// sure at most one `Captured` from this controller is live.
///
/// A capture that neither sees a terminal event nor gets released keeps
/// the controller busy forever, and every later `start` waits on it.
pub struct Capture<S, G = RwGate> {
    source: S,
    shared_gate: Arc<G>,
    gate: RwGate,
}

impl<S> Capture<S, RwGate> {
    /// Creates a controller whose shared gate is owned by it alone
    pub fn new(source: S) -> Self {
        Self::with_shared_gate(source, Arc::new(RwGate::new()))
    }
}

impl<S, G> Capture<S, G> {
    /// Creates a controller coordinating with whoever else holds
    /// `shared_gate`
    pub fn with_shared_gate(source: S, shared_gate: Arc<G>) -> Self {
        Self {
            source,
            shared_gate,
            gate: RwGate::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn shared_gate(&self) -> &Arc<G> {
        &self.shared_gate
    }
}

impl<S, G> Capture<S, G>
where
    S: Source + 'static,
    G: Gate,
{
    /// Waits until no other capture from this controller is live and the
    /// shared gate is free, then arms a new capture.
    ///
    /// There is no timeout; race the returned future against a timer to
    /// bound the wait. Fails only if a gate fails, in which case nothing
    /// stays acquired.
    pub async fn start(&self) -> Result<Captured<S, G>, GateError> {
        trace!("Waiting for previous capture to end");
        let handle = self.gate.acquire_exclusive().await?;

        trace!("Waiting on shared gate");
        let shared = match self.shared_gate.acquire_exclusive().await {
            Ok(x) => x,
            Err(x) => {
                debug!("Unable to start capture: {}", x);
                handle.release();
                return Err(x);
            }
        };

        debug!("Starting capture");
        Ok(Captured::new(
            handle,
            &self.source,
            Arc::clone(&self.shared_gate),
            shared,
        ))
    }
}

impl<S: fmt::Debug, G> fmt::Debug for Capture<S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("source", &self.source)
            .finish()
    }
}
