mod parsers;

use crate::capture::Capture;
use clap::Parser;
use futures::stream::{self, Stream};
use gated_capture_utils::{pump, RwGate, Subject};
use log::{debug, info};
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, about, version)]
pub struct Opts {
    /// Time (in milliseconds) between two values of the ticking producer
    #[clap(long, parse(try_from_str = parsers::parse_duration_millis), default_value = "250")]
    pub interval: Duration,

    /// Number of captures to perform one after another
    #[clap(short, long, default_value = "3")]
    pub captures: usize,

    /// Release each capture right after starting it instead of waiting
    /// for a value
    #[clap(long)]
    pub release: bool,

    /// Longest time (in milliseconds) to wait on starting a capture or on
    /// its value
    #[clap(long, parse(try_from_str = parsers::parse_duration_millis), default_value = "5000")]
    pub timeout: Duration,
}

/// Counter emitting 0, 1, 2, ... with `interval` between values
fn ticker(interval: Duration) -> impl Stream<Item = Result<u64, Infallible>> {
    stream::unfold(0u64, move |n| async move {
        sleep(interval).await;
        Some((Ok(n), n + 1))
    })
}

/// Primary entrypoint to run the executable based on input options
pub async fn run(opts: Opts) -> Result<(), Box<dyn Error>> {
    let subject = Subject::<u64, Infallible>::new();
    let gate = Arc::new(RwGate::new());
    let capture = Capture::with_shared_gate(subject.clone(), Arc::clone(&gate));

    let producer = {
        let subject = subject.clone();
        let gate = Arc::clone(&gate);
        let values = ticker(opts.interval);
        tokio::spawn(async move { pump(values, &subject, gate.as_ref()).await })
    };

    for i in 0..opts.captures {
        let captured = timeout(opts.timeout, capture.start()).await??;
        debug!("Capture #{} started", i);

        if opts.release {
            captured.release().await;
        }

        match timeout(opts.timeout, captured.to_future()).await? {
            Ok(value) => println!("{}", value),
            Err(x) => println!("{} ({})", x, x.kind()),
        }
    }

    info!("Finished {} capture(s)", opts.captures);
    gate.close();
    producer.abort();

    Ok(())
}
