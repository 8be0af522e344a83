use derive_more::Display;
use gated_capture_utils::GateError;
use std::error::Error;
use std::fmt;

/// Coarse classification of a `CaptureError`, independent of the stream's
/// own error type
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Stream,
    CompletedWithoutValue,
    PrematureRelease,
    GateAcquisition,
    Compound,
}

/// Reason a capture did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError<E> {
    /// Error emitted by the stream, passed through as is
    Stream(E),

    /// Stream completed before emitting anything
    CompletedWithoutValue,

    /// Capture was released before the stream produced anything
    PrematureRelease,

    /// Shared gate could not be acquired to finalize a captured value
    GateAcquisition(GateError),

    /// Terminal cause that raced with a failure to acquire the shared gate
    Compound {
        primary: Box<CaptureError<E>>,
        secondary: GateError,
    },
}

impl<E> CaptureError<E> {
    pub fn compound(primary: CaptureError<E>, secondary: GateError) -> Self {
        Self::Compound {
            primary: Box::new(primary),
            secondary,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stream(_) => ErrorKind::Stream,
            Self::CompletedWithoutValue => ErrorKind::CompletedWithoutValue,
            Self::PrematureRelease => ErrorKind::PrematureRelease,
            Self::GateAcquisition(_) => ErrorKind::GateAcquisition,
            Self::Compound { .. } => ErrorKind::Compound,
        }
    }

    /// Cause that ended the capture, looking through any compound wrapping
    pub fn primary(&self) -> &CaptureError<E> {
        match self {
            Self::Compound { primary, .. } => primary.primary(),
            x => x,
        }
    }

    /// Gate failure involved in ending the capture, if any
    pub fn gate_error(&self) -> Option<&GateError> {
        match self {
            Self::GateAcquisition(x) => Some(x),
            Self::Compound { secondary, .. } => Some(secondary),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CaptureError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(x) => write!(f, "Stream failed: {}", x),
            Self::CompletedWithoutValue => {
                write!(f, "Stream completed without emitting a new value")
            }
            Self::PrematureRelease => {
                write!(f, "Capture released before stream emitted a new value")
            }
            Self::GateAcquisition(x) => {
                write!(f, "Failed to acquire shared gate: {}", x)
            }
            Self::Compound { primary, secondary } => {
                write!(f, "{} (and failed to acquire shared gate: {})", primary, secondary)
            }
        }
    }
}

impl<E> Error for CaptureError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Stream(x) => Some(x),
            Self::GateAcquisition(x) => Some(x),
            Self::Compound { primary, .. } => Some(primary.as_ref()),
            _ => None,
        }
    }
}
