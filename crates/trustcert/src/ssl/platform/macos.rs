use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{
    debug,
    info,
    warn,
};

use super::TrustStore;
use super::command::{
    CommandOutput,
    CommandRunner,
    to_args,
};
use crate::error::{
    Error,
    Result,
};

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";
const SHA1_PREFIX: &str = "SHA-1 hash:";

pub struct MacosTrustStore {
    runner: Arc<dyn CommandRunner>,
    elevate: bool,
}

impl MacosTrustStore {
    pub fn new(runner: Arc<dyn CommandRunner>, elevate: bool) -> Self {
        Self { runner, elevate }
    }

    async fn security(&self, args: &[&str], privileged: bool) -> Result<CommandOutput> {
        let mut full_args = to_args(args);
        if privileged && self.elevate {
            full_args.insert(0, "security".to_string());
            self.runner.run("sudo", &full_args).await
        } else {
            self.runner.run("security", &full_args).await
        }
    }
}

fn parse_sha1_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(SHA1_PREFIX))
        .map(|hash| hash.trim().to_uppercase())
        .filter(|hash| !hash.is_empty())
        .collect()
}

#[async_trait]
impl TrustStore for MacosTrustStore {
    fn platform(&self) -> &'static str {
        "macos"
    }

    async fn add(&self, name: &str, cert_path: &Path) -> Result<()> {
        let path = cert_path.to_string_lossy().into_owned();
        info!("Adding {} to the System keychain as {}", path, name);

        let output = self
            .security(
                &[
                    "add-trusted-cert",
                    "-d",
                    "-r",
                    "trustRoot",
                    "-k",
                    SYSTEM_KEYCHAIN,
                    path.as_str(),
                ],
                true,
            )
            .await?;

        if output.success {
            Ok(())
        } else {
            Err(Error::TrustStore(format!(
                "security add-trusted-cert failed: {}",
                output.message()
            )))
        }
    }

    async fn remove(&self, name: &str) -> bool {
        let hashes = match self.hash_list(name).await {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!("Failed to list keychain certificates named {}: {}", name, e);
                return false;
            }
        };

        for hash in hashes {
            debug!("Deleting keychain certificate {}", hash);
            match self
                .security(&["delete-certificate", "-Z", hash.as_str()], true)
                .await
            {
                Ok(output) if output.success => {}
                Ok(output) => {
                    warn!("Failed to delete certificate {}: {}", hash, output.message());
                    return false;
                }
                Err(e) => {
                    warn!("Failed to delete certificate {}: {}", hash, e);
                    return false;
                }
            }
        }

        true
    }

    async fn hash_list(&self, name: &str) -> Result<Vec<String>> {
        let output = self
            .security(&["find-certificate", "-a", "-c", name, "-Z"], false)
            .await?;

        // find-certificate exits non-zero when nothing matches.
        if !output.success {
            return Ok(Vec::new());
        }

        let hashes = parse_sha1_lines(&output.stdout);
        debug!("Keychain certificates named {}: {:?}", name, hashes);
        Ok(hashes)
    }
}
