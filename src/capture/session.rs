use super::error::CaptureError;
use super::future::{CapturedFuture, Deferred, Outcome};
use gated_capture_utils::{Gate, GateHandle, Handle, Observer, Source, Subscription};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle as Runtime;

/// First thing to happen to a session after it subscribed
enum Trigger<T, E> {
    Next(T),
    Error(E),
    Complete,
    Release,
}

impl<T, E> Trigger<T, E> {
    fn name(&self) -> &'static str {
        match self {
            Self::Next(_) => "value",
            Self::Error(_) => "error",
            Self::Complete => "completion",
            Self::Release => "release",
        }
    }

    fn into_result(self) -> Result<T, CaptureError<E>> {
        match self {
            Self::Next(x) => Ok(x),
            Self::Error(x) => Err(CaptureError::Stream(x)),
            Self::Complete => Err(CaptureError::CompletedWithoutValue),
            Self::Release => Err(CaptureError::PrematureRelease),
        }
    }
}

struct SessionState<U> {
    /// Set by the first terminal transition; everything arriving later is
    /// discarded
    released: bool,

    /// Set once the first stream signal has been handed to a finalization;
    /// only that signal may ever become the outcome
    triggered: bool,

    /// Private gate handle of the controller, held until termination
    handle: Option<GateHandle>,

    subscription: Option<U>,
}

struct Inner<S: Source, G: Gate> {
    /// Runtime that finalizations are spawned onto, since stream signals
    /// may arrive on threads outside of it
    runtime: Runtime,
    shared_gate: Arc<G>,
    deferred: Deferred<S::Item, S::Error>,
    state: Mutex<SessionState<S::Subscription>>,
}

impl<S, G> Inner<S, G>
where
    S: Source,
    G: Gate,
{
    fn lock(&self) -> MutexGuard<'_, SessionState<S::Subscription>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Pauses production by taking the shared gate, then tries to make
    /// `trigger` the session's outcome
    async fn finalize(&self, trigger: Trigger<S::Item, S::Error>) {
        trace!("Acquiring shared gate to finalize {}", trigger.name());
        match self.shared_gate.acquire_exclusive().await {
            Ok(shared) => {
                self.terminate(trigger.into_result(), Some(shared));
            }
            Err(x) => {
                warn!("Failed to acquire shared gate to finalize {}: {}", trigger.name(), x);
                let error = match trigger.into_result() {
                    Ok(_) => CaptureError::GateAcquisition(x),
                    Err(primary) => CaptureError::compound(primary, x),
                };
                self.terminate(Err(error), None);
            }
        }
    }

    /// Performs the terminal transition unless another one already won,
    /// returning whether this call was the one to perform it
    fn terminate(
        &self,
        result: Result<S::Item, CaptureError<S::Error>>,
        shared: Option<G::Handle>,
    ) -> bool {
        let (handle, subscription) = {
            let mut state = self.lock();
            if state.released {
                drop(state);
                trace!("Session already terminated, discarding late outcome");
                if let Some(shared) = shared {
                    shared.release();
                }
                return false;
            }

            state.released = true;
            (state.handle.take(), state.subscription.take())
        };

        debug!(
            "Capture terminated with {}",
            if result.is_ok() { "value" } else { "error" }
        );
        self.deferred.settle(result);

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(handle) = handle {
            handle.release();
        }
        if let Some(shared) = shared {
            shared.release();
        }

        true
    }
}

impl<S, G> Inner<S, G>
where
    S: Source + 'static,
    G: Gate,
{
    /// Hands the first stream signal off to a finalization attempt,
    /// discarding every signal after it
    fn observe(inner: &Arc<Self>, trigger: Trigger<S::Item, S::Error>) {
        {
            let mut state = inner.lock();
            if state.released || state.triggered {
                drop(state);
                trace!("Discarding {} observed after first signal", trigger.name());
                return;
            }
            state.triggered = true;
        }

        let runtime = inner.runtime.clone();
        let inner = Arc::clone(inner);
        runtime.spawn(async move { inner.finalize(trigger).await });
    }
}

/// Forwards stream signals into the session that subscribed it
struct SessionObserver<S: Source, G: Gate> {
    inner: Arc<Inner<S, G>>,
}

impl<S, G> Observer<S::Item, S::Error> for SessionObserver<S, G>
where
    S: Source + 'static,
    G: Gate,
{
    fn on_next(&self, value: S::Item) {
        Inner::observe(&self.inner, Trigger::Next(value));
    }

    fn on_error(&self, error: S::Error) {
        Inner::observe(&self.inner, Trigger::Error(error));
    }

    fn on_complete(&self) {
        Inner::observe(&self.inner, Trigger::Complete);
    }
}

/// A single capture attempt, live from subscription until the first
/// terminal event or `release`
///
/// Clones refer to the same session.
pub struct Captured<S: Source, G: Gate> {
    inner: Arc<Inner<S, G>>,
}

impl<S, G> Captured<S, G>
where
    S: Source + 'static,
    G: Gate,
{
    /// Subscribes to `source` on behalf of the holder of `handle`, then
    /// gives back `shared` so production can resume while armed
    ///
    /// Must be called from within a tokio runtime; finalizations of stream
    /// signals are spawned onto it.
    pub(crate) fn new(
        handle: GateHandle,
        source: &S,
        shared_gate: Arc<G>,
        shared: G::Handle,
    ) -> Self {
        let inner = Arc::new(Inner {
            runtime: Runtime::current(),
            shared_gate,
            deferred: Deferred::new(),
            state: Mutex::new(SessionState {
                released: false,
                triggered: false,
                handle: Some(handle),
                subscription: None,
            }),
        });

        let subscription = source.subscribe(SessionObserver {
            inner: Arc::clone(&inner),
        });

        {
            let mut state = inner.lock();
            if state.released {
                // Still holding `shared`, so only a finalization that failed
                // to acquire the shared gate (closed) can have ended it
                drop(state);
                subscription.unsubscribe();
            } else {
                state.subscription = Some(subscription);
            }
        }

        trace!("Capture armed, releasing shared gate");
        shared.release();

        Self { inner }
    }

    /// Future of the captured value. Can be called any number of times,
    /// before or after the capture ended.
    pub fn to_future(&self) -> CapturedFuture<S::Item, S::Error> {
        CapturedFuture::new(self.inner.deferred.clone())
    }

    /// Current outcome, without waiting
    pub fn outcome(&self) -> Outcome<S::Item, S::Error>
    where
        S::Item: Clone,
        S::Error: Clone,
    {
        self.inner.deferred.outcome()
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// Ends the capture early. If nothing terminated it yet, its future
    /// fails with `PrematureRelease` (compounded with the gate's failure if
    /// the shared gate cannot be acquired). Does nothing once terminated.
    pub async fn release(&self) -> &Self {
        if self.inner.is_released() {
            trace!("Capture already released");
        } else {
            self.inner.finalize(Trigger::Release).await;
        }

        self
    }
}

impl<S: Source, G: Gate> Clone for Captured<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Source, G: Gate> fmt::Debug for Captured<S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Captured {{ released: {}, settled: {} }}",
            self.inner.lock().released,
            self.inner.deferred.is_settled(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gated_capture_utils::{GateError, RwGate, Subject};

    type TestSubject = Subject<u32, String>;

    async fn arm(
        subject: &TestSubject,
        gate: &Arc<RwGate>,
    ) -> (RwGate, Captured<TestSubject, RwGate>) {
        let private = RwGate::new();
        let handle = private.try_acquire_exclusive().unwrap();
        let shared = gate.acquire_exclusive().await.unwrap();
        let captured = Captured::new(handle, subject, Arc::clone(gate), shared);
        (private, captured)
    }

    async fn wait_for_release(captured: &Captured<TestSubject, RwGate>) {
        for _ in 0..10 {
            if captured.is_released() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("Capture never terminated");
    }

    #[tokio::test]
    async fn new_should_subscribe_and_give_back_shared_gate() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());

        let (private, captured) = arm(&subject, &gate).await;

        assert_eq!(subject.observer_count(), 1);
        assert!(gate.try_acquire_shared().is_ok());
        assert_eq!(
            private.try_acquire_shared().unwrap_err(),
            GateError::WouldBlock
        );
        assert!(captured.outcome().is_pending());
    }

    #[tokio::test]
    async fn value_should_settle_and_clean_up() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (private, captured) = arm(&subject, &gate).await;

        subject.next(0);
        wait_for_release(&captured).await;

        assert_eq!(captured.outcome(), Outcome::Value(0));
        assert_eq!(subject.observer_count(), 0);
        assert!(private.try_acquire_exclusive().is_ok());
        assert!(gate.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn late_signals_should_not_change_outcome() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (_private, captured) = arm(&subject, &gate).await;

        // Hold the gate so the first signal has to wait on it
        let held = gate.acquire_exclusive().await.unwrap();
        subject.next(4);
        subject.next(5);
        subject.error(String::from("late"));
        held.release();

        wait_for_release(&captured).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(captured.outcome(), Outcome::Value(4));
        assert_eq!(captured.to_future().await, Ok(4));
        assert!(gate.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn only_first_of_back_to_back_signals_should_be_finalized() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (_private, captured) = arm(&subject, &gate).await;

        subject.next(1);
        subject.next(2);
        subject.complete();

        assert_eq!(captured.to_future().await, Ok(1));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(captured.outcome(), Outcome::Value(1));
        assert!(gate.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn signal_from_thread_outside_runtime_should_finalize() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (private, captured) = arm(&subject, &gate).await;

        let emitter = subject.clone();
        std::thread::spawn(move || emitter.next(6))
            .join()
            .expect("Emitting thread panicked");

        assert_eq!(captured.to_future().await, Ok(6));
        assert_eq!(subject.observer_count(), 0);
        assert!(private.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn completion_of_terminated_source_should_be_seen_at_subscribe() {
        let subject = TestSubject::new();
        subject.complete();
        let gate = Arc::new(RwGate::new());

        let (private, captured) = arm(&subject, &gate).await;
        wait_for_release(&captured).await;

        assert_eq!(
            captured.outcome(),
            Outcome::Error(CaptureError::CompletedWithoutValue)
        );
        assert!(private.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn release_with_closed_gate_should_compound_errors() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (private, captured) = arm(&subject, &gate).await;

        gate.close();
        let returned = captured.release().await;
        assert!(std::ptr::eq(returned, &captured));

        assert_eq!(
            captured.outcome(),
            Outcome::Error(CaptureError::compound(
                CaptureError::PrematureRelease,
                GateError::Closed
            ))
        );
        assert_eq!(subject.observer_count(), 0);
        assert!(private.try_acquire_exclusive().is_ok());
    }

    #[tokio::test]
    async fn value_with_closed_gate_should_report_acquisition_failure() {
        let subject = TestSubject::new();
        let gate = Arc::new(RwGate::new());
        let (private, captured) = arm(&subject, &gate).await;

        gate.close();
        subject.next(9);
        wait_for_release(&captured).await;

        assert_eq!(
            captured.outcome(),
            Outcome::Error(CaptureError::GateAcquisition(GateError::Closed))
        );
        assert!(private.try_acquire_exclusive().is_ok());
    }
}
