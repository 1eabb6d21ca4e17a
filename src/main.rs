// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;

use dlc_inference::cli::args::{Cli, Commands};
use dlc_inference::cli::logging::{init_tracing, set_verbose};
use dlc_inference::cli::predict::run_prediction;

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Predict(args) => {
            set_verbose(args.verbose);
            init_tracing(args.verbose);
            run_prediction(args);
        }
    }
}
