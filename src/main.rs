use clap::Parser;
use gated_capture::cli;
use tokio::runtime::Builder;

fn main() {
    env_logger::init();
    let opts = cli::Opts::parse();

    #[cfg(feature = "multi-threaded")]
    let mut builder = Builder::new_multi_thread();

    #[cfg(not(feature = "multi-threaded"))]
    let mut builder = Builder::new_current_thread();

    let rt = builder
        .enable_time()
        .build()
        .expect("Failed to start runtime");

    if let Err(x) = rt.block_on(cli::run(opts)) {
        eprintln!("{}", x);
        std::process::exit(1);
    }
}
