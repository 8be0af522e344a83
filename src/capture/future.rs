use super::error::CaptureError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// Where a capture stands; leaves `Pending` at most once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Pending,
    Value(T),
    Error(CaptureError<E>),
}

impl<T, E> Outcome<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Converts a decided outcome into a result, yielding `None` while
    /// still pending
    pub fn into_result(self) -> Option<Result<T, CaptureError<E>>> {
        match self {
            Self::Pending => None,
            Self::Value(x) => Some(Ok(x)),
            Self::Error(x) => Some(Err(x)),
        }
    }
}

impl<T, E> From<Result<T, CaptureError<E>>> for Outcome<T, E> {
    fn from(result: Result<T, CaptureError<E>>) -> Self {
        match result {
            Ok(x) => Self::Value(x),
            Err(x) => Self::Error(x),
        }
    }
}

struct DeferredState<T, E> {
    outcome: Outcome<T, E>,
    wakers: Vec<Waker>,
}

/// Single-resolution cell shared between a capture session and every
/// future handed out for it
pub(crate) struct Deferred<T, E> {
    state: Arc<Mutex<DeferredState<T, E>>>,
}

impl<T, E> Deferred<T, E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeferredState {
                outcome: Outcome::Pending,
                wakers: Vec::new(),
            })),
        }
    }

    /// Decides the outcome if nothing has decided it yet, waking anyone
    /// waiting on it. Returns false if the outcome was already decided.
    pub fn settle(&self, result: Result<T, CaptureError<E>>) -> bool {
        let wakers = {
            let mut state = self.lock();
            if !state.outcome.is_pending() {
                return false;
            }

            state.outcome = Outcome::from(result);
            std::mem::take(&mut state.wakers)
        };

        for waker in wakers {
            waker.wake();
        }

        true
    }

    pub fn is_settled(&self) -> bool {
        !self.lock().outcome.is_pending()
    }

    pub fn outcome(&self) -> Outcome<T, E>
    where
        T: Clone,
        E: Clone,
    {
        self.lock().outcome.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DeferredState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

/// Resolves to the value captured by a session, or to the reason the
/// capture ended without one. Every future obtained from the same session
/// observes the same outcome.
pub struct CapturedFuture<T, E> {
    deferred: Deferred<T, E>,
}

impl<T, E> CapturedFuture<T, E> {
    pub(crate) fn new(deferred: Deferred<T, E>) -> Self {
        Self { deferred }
    }

    pub fn is_settled(&self) -> bool {
        self.deferred.is_settled()
    }

    /// Whether both futures were handed out by the same session
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.deferred.state, &other.deferred.state)
    }
}

impl<T, E> Clone for CapturedFuture<T, E> {
    fn clone(&self) -> Self {
        Self::new(self.deferred.clone())
    }
}

impl<T, E> Future for CapturedFuture<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, CaptureError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.deferred.lock();

        match state.outcome.clone().into_result() {
            Some(result) => Poll::Ready(result),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
