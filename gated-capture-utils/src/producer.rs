use crate::gate::{Gate, GateError, Handle};
use crate::subject::Subject;
use futures::{Stream, StreamExt};
use log::{debug, trace};

/// Forwards every item of `stream` into `subject`, holding a shared handle
/// on `gate` while each item is emitted. An `Err` item becomes the
/// subject's error and ends the pump; exhausting the stream completes the
/// subject.
///
/// Anyone holding `gate` exclusively therefore pauses production between
/// items. Fails only if the gate itself fails, leaving the subject open.
pub async fn pump<T, E, S, G>(stream: S, subject: &Subject<T, E>, gate: &G) -> Result<(), GateError>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Stream<Item = Result<T, E>>,
    G: Gate,
{
    futures::pin_mut!(stream);

    let mut count = 0usize;
    while let Some(item) = stream.next().await {
        let handle = gate.acquire_shared().await?;
        match item {
            Ok(value) => {
                trace!("Emitting value #{}", count);
                subject.next(value);
                handle.release();
                count += 1;
            }
            Err(x) => {
                debug!("Emitting error after {} value(s)", count);
                subject.error(x);
                handle.release();
                return Ok(());
            }
        }
    }

    let handle = gate.acquire_shared().await?;
    debug!("Completing after {} value(s)", count);
    subject.complete();
    handle.release();

    Ok(())
}
