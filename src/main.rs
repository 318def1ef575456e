//! This file defines the imars3d binary entry point.

use imars3d::app;
use imars3d::cli;
use imars3d::tracing;
use imars3d::workflow::Registry;

/// Application entry point
fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(err) = app::run(&args, Registry::with_defaults()) {
        err.log();
        std::process::exit(err.kind().exit_code());
    }
}
