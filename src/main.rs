use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use retrocam::cli::{self, Args};
use retrocam::logger;

fn main() -> ExitCode {
    logger::init();
    let args = Args::parse();

    // Set up Ctrl+C handler
    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = cli::setup_ctrlc_handler(Arc::clone(&stop)) {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    match cli::dispatch(args.command, args.config.as_deref(), stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
