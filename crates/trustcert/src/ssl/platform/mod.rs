use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{
    Error,
    Result,
};

mod command;
pub mod linux;
pub mod macos;
pub mod windows;

#[cfg(test)]
pub use command::MockCommandRunner;
pub use command::{
    CommandOutput,
    CommandRunner,
    SystemCommandRunner,
};
pub use linux::LinuxTrustStore;
pub use macos::MacosTrustStore;
pub use windows::WindowsTrustStore;

/// OS trust store, addressed by certificate common name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrustStore: Send + Sync {
    fn platform(&self) -> &'static str;

    /// Registers the certificate file as trusted under `name`. Usually needs
    /// elevated privileges.
    async fn add(&self, name: &str, cert_path: &Path) -> Result<()>;

    /// Removes every entry trusted under `name`. Failure is reported as
    /// `false`, never as an error.
    async fn remove(&self, name: &str) -> bool;

    /// Upper-case SHA-1 fingerprints currently trusted under `name`; empty
    /// when there are none.
    async fn hash_list(&self, name: &str) -> Result<Vec<String>>;
}

pub fn trust_store_for(os: &str, runner: Arc<dyn CommandRunner>) -> Result<Arc<dyn TrustStore>> {
    let elevate = needs_elevation();

    match os {
        "macos" => Ok(Arc::new(MacosTrustStore::new(runner, elevate))),
        "windows" => Ok(Arc::new(WindowsTrustStore::new(runner))),
        "linux" => Ok(Arc::new(LinuxTrustStore::detect(runner, elevate))),
        other => Err(Error::UnsupportedPlatform(other.to_string())),
    }
}

/// Adapter for the running OS, with every external command bounded by
/// `command_timeout`.
pub fn detect_trust_store(command_timeout: Duration) -> Result<Arc<dyn TrustStore>> {
    trust_store_for(
        std::env::consts::OS,
        Arc::new(SystemCommandRunner::new(command_timeout)),
    )
}

#[cfg(unix)]
fn needs_elevation() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() != 0 }
}

#[cfg(not(unix))]
fn needs_elevation() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Arc<dyn CommandRunner> {
        Arc::new(MockCommandRunner::new())
    }

    #[test]
    fn test_adapter_selected_by_os() {
        assert_eq!(trust_store_for("macos", runner()).unwrap().platform(), "macos");
        assert_eq!(
            trust_store_for("windows", runner()).unwrap().platform(),
            "windows"
        );
        assert_eq!(trust_store_for("linux", runner()).unwrap().platform(), "linux");
    }

    #[test]
    fn test_unknown_os_is_unsupported() {
        match trust_store_for("haiku", runner()) {
            Err(Error::UnsupportedPlatform(os)) => assert_eq!(os, "haiku"),
            _ => panic!("expected UnsupportedPlatform"),
        }
    }
}
