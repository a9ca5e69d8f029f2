use std::fmt::Write as _;

use anyhow::{
    Context,
    Result,
};
use log::debug;
use serde::Serialize;
use trustcert::{
    InstallResult,
    SignRequest,
    SignedCert,
    TrustedCert,
};

use crate::cli::args::{
    Cli,
    Command,
};

pub struct CliHandler {
    cli: Cli,
}

impl CliHandler {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.cli.config()?;
        debug!("Using certificate directory {}", config.dir.display());

        let trusted_cert = TrustedCert::new(config).context("Failed to set up the trust store")?;
        let output = self.execute(&trusted_cert).await?;
        println!("{output}");

        Ok(())
    }

    pub async fn execute(&self, trusted_cert: &TrustedCert) -> Result<String> {
        match &self.cli.command {
            Command::Install { hosts, overwrite } => {
                let result = trusted_cert
                    .install(hosts, *overwrite)
                    .await
                    .context("Install failed")?;
                self.render(&result, describe_install)
            }
            Command::Uninstall => {
                let report = trusted_cert
                    .uninstall()
                    .await
                    .context("Uninstall failed")?;
                self.render(&report, |report| {
                    if report.removed {
                        "uninstalled".to_string()
                    } else {
                        format!(
                            "leaf removed; CA trust could not be revoked, CA kept in {}",
                            trusted_cert.config().dir.display()
                        )
                    }
                })
            }
            Command::Sign {
                hosts,
                overwrite,
                name,
                expires_in_days,
            } => {
                let mut request = SignRequest::new(hosts.iter().cloned()).overwrite(*overwrite);
                if let Some(name) = name {
                    request = request.name(name);
                }
                if let Some(days) = expires_in_days {
                    request = request.expires_in(time::Duration::days(i64::from(*days)));
                }

                let signed = trusted_cert.sign(&request).await.context("Sign failed")?;
                self.render(&signed, describe_signed)
            }
            Command::Trust => {
                let trusted = trusted_cert.trust().await.context("Trust failed")?;
                self.render(&serde_json::json!({ "trusted": trusted }), |_| {
                    if trusted {
                        "CA trusted".to_string()
                    } else {
                        "CA not trusted (rerun with --log-level info for details)".to_string()
                    }
                })
            }
            Command::Info => {
                let status = trusted_cert.info().await.context("Failed to read leaf")?;
                self.render(&status, ToString::to_string)
            }
            Command::CaInfo => {
                let status = trusted_cert.ca_info().await.context("Failed to read CA")?;
                self.render(&status, ToString::to_string)
            }
        }
    }

    fn render<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<String> {
        if self.cli.json {
            serde_json::to_string_pretty(value).context("Failed to serialize output")
        } else {
            Ok(text(value))
        }
    }
}

fn describe_signed(signed: &SignedCert) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "certificate {}: {}", signed.outcome, signed.cert_path.display());
    let _ = writeln!(out, "key:   {}", signed.key_path.display());
    let _ = write!(out, "hosts: {}", signed.hosts.join(", "));
    out
}

fn describe_install(result: &InstallResult) -> String {
    let trust = if result.trusted {
        "trusted"
    } else {
        "NOT trusted"
    };
    format!("{}\nCA:    {}", describe_signed(&result.cert), trust)
}
