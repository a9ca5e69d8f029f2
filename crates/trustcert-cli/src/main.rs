mod cli;
mod logging;

use anyhow::{
    Result,
    anyhow,
};
use clap::Parser;

use crate::cli::{
    Cli,
    CliHandler,
};
use crate::logging::{
    FileLoggerInitializer,
    LogConfig,
    LoggerInitializer,
    StderrLoggerInitializer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LogConfig::new(cli.log_level());

    let initializer: Box<dyn LoggerInitializer> = if let Some(path) = cli.log_file.clone() {
        config = config.with_file_output(path);
        Box::new(FileLoggerInitializer)
    } else {
        Box::new(StderrLoggerInitializer)
    };

    initializer
        .initialize(&config)
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    CliHandler::new(cli).run().await
}
