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
    CommandRunner,
    to_args,
};
use crate::error::{
    Error,
    Result,
};

const SHA1_MARKER: &str = "(sha1):";

/// Current-user ROOT store through `certutil`; no elevation needed.
pub struct WindowsTrustStore {
    runner: Arc<dyn CommandRunner>,
}

impl WindowsTrustStore {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

fn parse_verifystore(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let index = line.to_ascii_lowercase().find(SHA1_MARKER)?;
            let hash: String = line[index + SHA1_MARKER.len()..]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            Some(hash.to_uppercase())
        })
        .filter(|hash| !hash.is_empty())
        .collect()
}

#[async_trait]
impl TrustStore for WindowsTrustStore {
    fn platform(&self) -> &'static str {
        "windows"
    }

    async fn add(&self, name: &str, cert_path: &Path) -> Result<()> {
        let path = cert_path.to_string_lossy().into_owned();
        info!("Adding {} to the user ROOT store as {}", path, name);

        let output = self
            .runner
            .run(
                "certutil",
                &to_args(&["-addstore", "-user", "root", path.as_str()]),
            )
            .await?;

        if output.success {
            Ok(())
        } else {
            Err(Error::TrustStore(format!(
                "certutil -addstore failed: {}",
                output.message()
            )))
        }
    }

    async fn remove(&self, name: &str) -> bool {
        match self
            .runner
            .run("certutil", &to_args(&["-delstore", "-user", "root", name]))
            .await
        {
            Ok(output) if output.success => true,
            Ok(output) => {
                warn!("certutil -delstore failed: {}", output.message());
                false
            }
            Err(e) => {
                warn!("certutil -delstore failed: {}", e);
                false
            }
        }
    }

    async fn hash_list(&self, name: &str) -> Result<Vec<String>> {
        let output = self
            .runner
            .run("certutil", &to_args(&["-verifystore", "-user", "root", name]))
            .await?;

        if !output.success {
            debug!("No ROOT store entries named {}: {}", name, output.message());
            return Ok(Vec::new());
        }

        Ok(parse_verifystore(&output.stdout))
    }
}
