use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Receives the signals of a push source: zero or more values followed by
/// at most one error or completion
pub trait Observer<T, E>: Send + 'static {
    fn on_next(&self, value: T);
    fn on_error(&self, error: E);
    fn on_complete(&self);
}

/// Live registration of an observer with a source
pub trait Subscription: Send + 'static {
    /// Detaches the observer; once this returns the source delivers
    /// nothing more to it
    fn unsubscribe(self);
}

/// Push-based asynchronous value source
pub trait Source {
    type Item: Send + 'static;
    type Error: Send + 'static;
    type Subscription: Subscription;

    fn subscribe<O>(&self, observer: O) -> Self::Subscription
    where
        O: Observer<Self::Item, Self::Error>;
}

#[derive(Clone)]
enum Terminal<E> {
    Error(E),
    Complete,
}

struct SubjectState<T, E> {
    /// Observers keyed by the id of their subscription
    observers: HashMap<u32, Box<dyn Observer<T, E>>>,
    next_id: u32,
    terminal: Option<Terminal<E>>,
}

impl<T, E> Default for SubjectState<T, E> {
    fn default() -> Self {
        Self {
            observers: HashMap::default(),
            next_id: 0,
            terminal: None,
        }
    }
}

/// Hot multicast source: every value pushed through `next` reaches each
/// observer subscribed at that moment. Late subscribers see only the
/// terminal signal, if one was already sent.
///
/// Observers are invoked while the subject is locked, so they must not
/// call back into the same subject synchronously.
pub struct Subject<T, E> {
    state: Arc<Mutex<SubjectState<T, E>>>,
}

impl<T, E> Subject<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.state).observers.len()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.state).terminal.is_some()
    }

    /// Delivers `value` to every live observer; ignored after a terminal
    /// signal
    pub fn next(&self, value: T)
    where
        T: Clone,
    {
        let state = lock(&self.state);
        if state.terminal.is_some() {
            trace!("Discarding value sent after terminal signal");
            return;
        }

        for observer in state.observers.values() {
            observer.on_next(value.clone());
        }
    }

    pub fn error(&self, error: E)
    where
        E: Clone,
    {
        self.terminate(Terminal::Error(error));
    }

    pub fn complete(&self)
    where
        E: Clone,
    {
        self.terminate(Terminal::Complete);
    }

    fn terminate(&self, terminal: Terminal<E>)
    where
        E: Clone,
    {
        let observers = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                return;
            }

            let observers = mem::take(&mut state.observers);
            trace!("Terminating subject with {} observer(s)", observers.len());
            for observer in observers.values() {
                deliver(&**observer, terminal.clone());
            }
            state.terminal = Some(terminal);
            observers
        };

        // Observers may own resources that reach back into this subject
        drop(observers);
    }
}

impl<T, E> Default for Subject<T, E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState::default())),
        }
    }
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> fmt::Debug for Subject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        write!(
            f,
            "Subject {{ observers: {:?}, terminated: {} }}",
            state.observers.keys(),
            state.terminal.is_some(),
        )
    }
}

impl<T, E> Source for Subject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = T;
    type Error = E;
    type Subscription = SubjectSubscription<T, E>;

    fn subscribe<O>(&self, observer: O) -> Self::Subscription
    where
        O: Observer<T, E>,
    {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);

        let subscription = SubjectSubscription {
            id,
            state: Arc::downgrade(&self.state),
        };

        match state.terminal.clone() {
            Some(terminal) => {
                drop(state);
                trace!("Replaying terminal signal to late subscriber {}", id);
                deliver(&observer, terminal);
            }
            None => {
                trace!("Registering subscriber {}", id);
                state.observers.insert(id, Box::new(observer));
            }
        }

        subscription
    }
}

/// Registration returned by `Subject::subscribe`; dropping it has the same
/// effect as `unsubscribe`
pub struct SubjectSubscription<T, E> {
    id: u32,
    state: Weak<Mutex<SubjectState<T, E>>>,
}

impl<T, E> SubjectSubscription<T, E> {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl<T, E> Subscription for SubjectSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn unsubscribe(self) {
        drop(self);
    }
}

impl<T, E> Drop for SubjectSubscription<T, E> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let removed = lock(&state).observers.remove(&self.id);
            if removed.is_some() {
                trace!("Removed subscriber {}", self.id);
            }
        }
    }
}

fn deliver<T, E>(observer: &dyn Observer<T, E>, terminal: Terminal<E>)
where
    T: 'static,
    E: 'static,
{
    match terminal {
        Terminal::Error(x) => observer.on_error(x),
        Terminal::Complete => observer.on_complete(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Signal {
        Next(u32),
        Error(String),
        Complete,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        signals: Arc<Mutex<Vec<Signal>>>,
    }

    impl Recorder {
        fn signals(&self) -> Vec<Signal> {
            self.signals.lock().unwrap().clone()
        }
    }

    impl Observer<u32, String> for Recorder {
        fn on_next(&self, value: u32) {
            self.signals.lock().unwrap().push(Signal::Next(value));
        }

        fn on_error(&self, error: String) {
            self.signals.lock().unwrap().push(Signal::Error(error));
        }

        fn on_complete(&self) {
            self.signals.lock().unwrap().push(Signal::Complete);
        }
    }

    #[test]
    fn next_should_reach_every_live_observer() {
        let subject = Subject::<u32, String>::new();
        let a = Recorder::default();
        let b = Recorder::default();

        let _sa = subject.subscribe(a.clone());
        let _sb = subject.subscribe(b.clone());
        assert_eq!(subject.observer_count(), 2);

        subject.next(0);
        subject.next(7);

        assert_eq!(a.signals(), vec![Signal::Next(0), Signal::Next(7)]);
        assert_eq!(b.signals(), vec![Signal::Next(0), Signal::Next(7)]);
    }

    #[test]
    fn unsubscribe_should_stop_delivery() {
        let subject = Subject::<u32, String>::new();
        let recorder = Recorder::default();

        let subscription = subject.subscribe(recorder.clone());
        subject.next(1);
        subscription.unsubscribe();
        subject.next(2);

        assert_eq!(recorder.signals(), vec![Signal::Next(1)]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn dropping_subscription_should_unsubscribe() {
        let subject = Subject::<u32, String>::new();
        let subscription = subject.subscribe(Recorder::default());
        assert_eq!(subject.observer_count(), 1);

        drop(subscription);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn terminal_signal_should_be_sent_once_and_end_delivery() {
        let subject = Subject::<u32, String>::new();
        let recorder = Recorder::default();
        let _subscription = subject.subscribe(recorder.clone());

        subject.error(String::from("boom"));
        subject.complete();
        subject.next(3);

        assert_eq!(recorder.signals(), vec![Signal::Error(String::from("boom"))]);
        assert!(subject.is_terminated());
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn late_subscriber_should_receive_terminal_signal() {
        let subject = Subject::<u32, String>::new();
        subject.next(1);
        subject.complete();

        let recorder = Recorder::default();
        let _subscription = subject.subscribe(recorder.clone());

        assert_eq!(recorder.signals(), vec![Signal::Complete]);
        assert_eq!(subject.observer_count(), 0);
    }
}
