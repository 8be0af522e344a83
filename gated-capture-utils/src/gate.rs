use derive_more::Display;
use futures::future::{BoxFuture, FutureExt};
use log::trace;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Number of permits backing a gate; an exclusive acquisition takes all of
/// them, a shared acquisition takes one
const MAX_READS: u32 = u32::MAX >> 3;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Shared,
    Exclusive,
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum GateError {
    #[display(fmt = "Gate closed")]
    Closed,

    #[display(fmt = "Gate held elsewhere")]
    WouldBlock,
}

impl Error for GateError {}

/// Single-use grant produced by a gate acquisition
pub trait Handle: Send + 'static {
    /// Gives the grant back to its gate; consuming the handle means it can
    /// only ever happen once
    fn release(self);
}

/// Reader-writer lock handing out releasable handles
pub trait Gate: Send + Sync + 'static {
    type Handle: Handle;

    fn acquire_shared(&self) -> BoxFuture<'static, Result<Self::Handle, GateError>>;

    fn acquire_exclusive(&self) -> BoxFuture<'static, Result<Self::Handle, GateError>>;
}

/// Fair reader-writer gate built on a semaphore. Waiters are served in the
/// order they queued, so a pending exclusive acquisition holds back any
/// shared acquisition requested after it.
///
/// Cloning produces another reference to the same gate.
#[derive(Debug, Clone)]
pub struct RwGate {
    semaphore: Arc<Semaphore>,
}

impl RwGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(MAX_READS as usize)),
        }
    }

    /// Disposes of the gate. Pending and future acquisitions fail with
    /// `GateError::Closed`; handles already out may still be released.
    pub fn close(&self) {
        trace!("Closing gate");
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Attempts a shared acquisition without waiting
    pub fn try_acquire_shared(&self) -> Result<GateHandle, GateError> {
        self.try_acquire(Access::Shared)
    }

    /// Attempts an exclusive acquisition without waiting
    pub fn try_acquire_exclusive(&self) -> Result<GateHandle, GateError> {
        self.try_acquire(Access::Exclusive)
    }

    fn try_acquire(&self, access: Access) -> Result<GateHandle, GateError> {
        Arc::clone(&self.semaphore)
            .try_acquire_many_owned(permits_for(access))
            .map(|permit| GateHandle { access, permit })
            .map_err(|x| match x {
                TryAcquireError::Closed => GateError::Closed,
                TryAcquireError::NoPermits => GateError::WouldBlock,
            })
    }

    fn acquire(&self, access: Access) -> BoxFuture<'static, Result<GateHandle, GateError>> {
        let semaphore = Arc::clone(&self.semaphore);
        async move {
            trace!("Waiting on {} access", access);
            let permit = semaphore
                .acquire_many_owned(permits_for(access))
                .await
                .map_err(|_| GateError::Closed)?;
            trace!("Acquired {} access", access);
            Ok::<_, GateError>(GateHandle { access, permit })
        }
        .boxed()
    }
}

impl Default for RwGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate for RwGate {
    type Handle = GateHandle;

    fn acquire_shared(&self) -> BoxFuture<'static, Result<GateHandle, GateError>> {
        self.acquire(Access::Shared)
    }

    fn acquire_exclusive(&self) -> BoxFuture<'static, Result<GateHandle, GateError>> {
        self.acquire(Access::Exclusive)
    }
}

fn permits_for(access: Access) -> u32 {
    match access {
        Access::Shared => 1,
        Access::Exclusive => MAX_READS,
    }
}

/// Grant on a `RwGate`, given back on `release` or when dropped
#[derive(Debug)]
pub struct GateHandle {
    access: Access,
    permit: OwnedSemaphorePermit,
}

impl GateHandle {
    pub fn access(&self) -> Access {
        self.access
    }
}

impl Handle for GateHandle {
    fn release(self) {
        trace!("Releasing {} access", self.access);
        drop(self.permit);
    }
}
