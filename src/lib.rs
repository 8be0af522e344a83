pub mod capture;

#[cfg(feature = "cli")]
pub mod cli;

pub use capture::{Capture, CaptureError, Captured, CapturedFuture, ErrorKind, Outcome};
pub use gated_capture_utils::{
    pump, Access, Gate, GateError, GateHandle, Handle, Observer, RwGate, Source, Subject,
    SubjectSubscription, Subscription,
};
