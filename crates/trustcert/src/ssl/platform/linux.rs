use std::io::ErrorKind;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;

use async_trait::async_trait;
use log::{
    debug,
    info,
    warn,
};
use tokio::fs;

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
use crate::ssl::cert_codec;

const ANCHOR_DIRS: &[&str] = &[
    "/usr/local/share/ca-certificates",
    "/etc/pki/ca-trust/source/anchors",
    "/etc/ca-certificates/trust-source/anchors",
    "/usr/share/pki/trust/anchors",
];

const REFRESH_COMMANDS: &[(&str, &str, &[&str])] = &[
    (
        "/usr/sbin/update-ca-certificates",
        "update-ca-certificates",
        &[],
    ),
    ("/usr/bin/update-ca-trust", "update-ca-trust", &[]),
    ("/usr/bin/trust", "trust", &["extract-compat"]),
];

/// Command that rebuilds the system bundle after the anchor directory
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RefreshCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: to_args(args),
        }
    }
}

/// Anchor-directory trust store used by Debian, Fedora, Arch and SUSE
/// derivatives.
pub struct LinuxTrustStore {
    runner: Arc<dyn CommandRunner>,
    anchor_dir: PathBuf,
    refresh: Option<RefreshCommand>,
    elevate: bool,
}

impl LinuxTrustStore {
    pub fn new(
        runner: Arc<dyn CommandRunner>, anchor_dir: impl Into<PathBuf>,
        refresh: Option<RefreshCommand>, elevate: bool,
    ) -> Self {
        Self {
            runner,
            anchor_dir: anchor_dir.into(),
            refresh,
            elevate,
        }
    }

    /// Picks the first anchor directory and refresh tool present on this
    /// host, falling back to the Debian layout.
    pub fn detect(runner: Arc<dyn CommandRunner>, elevate: bool) -> Self {
        let anchor_dir = ANCHOR_DIRS
            .iter()
            .map(PathBuf::from)
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from(ANCHOR_DIRS[0]));

        let refresh = REFRESH_COMMANDS
            .iter()
            .find(|(path, _, _)| Path::new(path).exists())
            .map(|(_, program, args)| RefreshCommand::new(program, args));

        debug!(
            "Linux trust store: anchors in {}, refresh with {:?}",
            anchor_dir.display(),
            refresh
        );

        Self::new(runner, anchor_dir, refresh, elevate)
    }

    pub fn anchor_dir(&self) -> &Path {
        &self.anchor_dir
    }

    fn anchor_path(&self, name: &str) -> PathBuf {
        self.anchor_dir.join(format!("{}.crt", anchor_file_stem(name)))
    }

    async fn privileged(&self, program: &str, args: Vec<String>) -> Result<CommandOutput> {
        if self.elevate {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(program.to_string());
            full_args.extend(args);
            self.runner.run("sudo", &full_args).await
        } else {
            self.runner.run(program, &args).await
        }
    }

    async fn refresh(&self) -> Result<()> {
        let Some(refresh) = &self.refresh else {
            warn!(
                "No CA refresh command found; the system bundle may need a manual update after changes in {}",
                self.anchor_dir.display()
            );
            return Ok(());
        };

        let output = self
            .privileged(&refresh.program, refresh.args.clone())
            .await?;

        if output.success {
            info!("Refreshed system CA bundle with {}", refresh.program);
            Ok(())
        } else {
            Err(Error::TrustStore(format!(
                "{} failed: {}",
                refresh.program,
                output.message()
            )))
        }
    }

    /// Anchor files whose certificate common name equals `name`.
    async fn matching_anchors(&self, name: &str) -> Result<Vec<(PathBuf, String)>> {
        let mut entries = match fs::read_dir(&self.anchor_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.anchor_dir, e)),
        };

        let mut matches = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.anchor_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("crt") {
                continue;
            }

            let pem = match fs::read(&path).await {
                Ok(pem) => pem,
                Err(e) => {
                    debug!("Skipping unreadable anchor {}: {}", path.display(), e);
                    continue;
                }
            };

            let Ok(cert) = cert_codec::cert_from_pem(&pem) else {
                debug!("Skipping unparsable anchor {}", path.display());
                continue;
            };

            match cert_codec::get_cert_common_name(&cert) {
                Ok(common_name) if common_name == name => {
                    matches.push((path, cert_codec::fingerprint(&cert)?));
                }
                _ => {}
            }
        }

        matches.sort();
        Ok(matches)
    }
}

fn anchor_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if stem.trim_matches(|c| c == '-' || c == '.').is_empty() {
        "trustcert-ca".to_string()
    } else {
        stem
    }
}

#[async_trait]
impl TrustStore for LinuxTrustStore {
    fn platform(&self) -> &'static str {
        "linux"
    }

    async fn add(&self, name: &str, cert_path: &Path) -> Result<()> {
        let anchor = self.anchor_path(name);
        info!(
            "Installing {} as trust anchor {}",
            cert_path.display(),
            anchor.display()
        );

        let source = cert_path.to_string_lossy().into_owned();
        let target = anchor.to_string_lossy().into_owned();
        let output = self
            .privileged("cp", to_args(&[source.as_str(), target.as_str()]))
            .await?;

        if !output.success {
            return Err(Error::TrustStore(format!(
                "Failed to copy CA into {}: {}",
                self.anchor_dir.display(),
                output.message()
            )));
        }

        self.refresh().await
    }

    async fn remove(&self, name: &str) -> bool {
        let anchors = match self.matching_anchors(name).await {
            Ok(anchors) => anchors,
            Err(e) => {
                warn!("Failed to scan trust anchors for {}: {}", name, e);
                return false;
            }
        };

        for (path, _) in &anchors {
            let target = path.to_string_lossy().into_owned();
            match self.privileged("rm", to_args(&["-f", target.as_str()])).await {
                Ok(output) if output.success => debug!("Removed anchor {}", target),
                Ok(output) => {
                    warn!("Failed to remove anchor {}: {}", target, output.message());
                    return false;
                }
                Err(e) => {
                    warn!("Failed to remove anchor {}: {}", target, e);
                    return false;
                }
            }
        }

        if anchors.is_empty() {
            return true;
        }

        match self.refresh().await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    async fn hash_list(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .matching_anchors(name)
            .await?
            .into_iter()
            .map(|(_, hash)| hash)
            .collect())
    }
}
