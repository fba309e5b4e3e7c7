use std::process::ExitCode;

use clap::Parser;

use layersweep::api::cli::{self, Cli};
use layersweep::common::config::RunnerCfg;
use layersweep::common::log;

fn main() -> ExitCode {
    let env = RunnerCfg::load();
    log::init(&env.log_filter);

    let cli = Cli::parse();
    match cli.run(&env) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!(ev = "fatal", error = %format!("{err:#}"));
            eprintln!("error: {err:#}");
            ExitCode::from(cli::exit_status_for(&err))
        }
    }
}
