// Copyright (c) Microsoft Corporation.

use std::process;
use std::sync::Arc;

use log::info;

use matcycle::cli::{cli_arg_parser, OutputFormat};
use matcycle::driver;
use matcycle::report::{ConsoleReporter, JsonReporter, Reporter};
use matcycle::shutdown::Shutdown;

fn build_reporter(format: OutputFormat) -> Arc<dyn Reporter> {
    match format {
        OutputFormat::Console => Arc::new(ConsoleReporter),
        OutputFormat::Json => {
            let reporter = JsonReporter::new();
            info!("run id {}", reporter.run_id());
            Arc::new(reporter)
        }
    }
}

fn main() {
    env_logger::init();

    let args = cli_arg_parser();
    let reporter = build_reporter(args.format);
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid arguments: {}", e);
            process::exit(2);
        }
    };

    // used for signaling the driver that the run should end
    let shutdown = Arc::new(Shutdown::new());

    let sig = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Received Ctrl-C, stopping after the current round");
        sig.stop();
    }) {
        eprintln!("Error setting Ctrl-C handler: {}", e);
        process::exit(1);
    }

    if config.plan.max_rounds.is_none() && config.plan.max_dimension.is_none() {
        eprintln!("No round limit set, press Ctrl-C to stop");
    }

    match driver::run(&config, shutdown, reporter) {
        Ok(summary) => info!("worker rounds: {:?}", summary.worker_rounds),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
