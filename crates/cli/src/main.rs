// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, info};

use shexec::config::Config;
use shexec::error::{ErrorCode, ShellError};
use shexec::replay::{replay_input, ReplayOptions};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        let code = e.downcast_ref::<ShellError>().map(|e| e.code).unwrap_or(ErrorCode::Internal);
        std::process::exit(code.exit_status());
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the replayed events.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let options = ReplayOptions {
        default_session: config.session.clone(),
        format: config.output_format()?,
        service: config.service_config(),
    };
    let mut stdout = std::io::stdout().lock();
    let summary = replay_input(&options, config.input.as_deref(), &mut stdout).await?;
    info!(records = summary.records, events = summary.events, "replay complete");
    Ok(())
}
