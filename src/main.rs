// src/main.rs

use std::process::ExitCode;

use script_launcher::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("script-launcher error: {err:?}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("script-launcher error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
