use std::path::PathBuf;

use anyhow::{
    Result,
    anyhow,
};
use clap::{
    Parser,
    Subcommand,
};
use trustcert::TrustCertConfig;

use crate::logging;

/// Upper bound for `--expires-in-days`: one hundred years.
const MAX_LIFETIME_DAYS: u32 = 36_500;

#[derive(Parser, Debug)]
#[command(name = "trustcert")]
#[command(about = "Local certificate authority with OS trust store synchronization")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long,
        global = true,
        help = "Directory holding the CA and leaf files (default: per-user config dir)",
        value_name = "DIR"
    )]
    pub dir: Option<PathBuf>,

    #[arg(long, global = true, help = "File name of the CA pair", value_name = "NAME")]
    pub ca_name: Option<String>,

    #[arg(
        long,
        global = true,
        help = "File name of the leaf pair",
        value_name = "NAME"
    )]
    pub ssl_name: Option<String>,

    #[arg(long, global = true, help = "Print results as JSON")]
    pub json: bool,

    #[arg(long, global = true, help = "Set the log level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(
        short = 'q',
        long,
        global = true,
        help = "Only log errors",
        conflicts_with = "log_level"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        help = "Append logs to a file instead of stderr",
        value_name = "PATH"
    )]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the CA if needed, trust it and sign a certificate for the hosts
    Install {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,

        #[arg(long, help = "Re-sign for exactly these hosts")]
        overwrite: bool,
    },

    /// Remove CA trust and delete every generated file
    Uninstall,

    /// Sign a certificate for the hosts without touching trust
    Sign {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,

        #[arg(long, help = "Re-sign for exactly these hosts")]
        overwrite: bool,

        #[arg(long, help = "File name for this certificate pair", value_name = "NAME")]
        name: Option<String>,

        #[arg(
            long,
            help = "Certificate lifetime in days",
            value_name = "DAYS",
            value_parser = clap::value_parser!(u32).range(1..=MAX_LIFETIME_DAYS as i64)
        )]
        expires_in_days: Option<u32>,
    },

    /// Add the CA to the OS trust store if it is not trusted yet
    Trust,

    /// Show the leaf certificate
    Info,

    /// Show the CA and whether the OS trusts it
    CaInfo,
}

impl Cli {
    pub fn config(&self) -> Result<TrustCertConfig> {
        let mut config = match &self.dir {
            Some(dir) => TrustCertConfig::new(dir),
            None => TrustCertConfig::from_env().map_err(|e| anyhow!(e))?,
        };

        if let Some(name) = &self.ca_name {
            config = config.with_ca_name(name);
        }
        if let Some(name) = &self.ssl_name {
            config = config.with_ssl_name(name);
        }

        Ok(config)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }

        self.log_level
            .as_deref()
            .map(logging::parse_level)
            .unwrap_or(log::LevelFilter::Warn)
    }
}
