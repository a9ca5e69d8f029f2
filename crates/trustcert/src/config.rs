use std::env;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Duration;

pub const DEFAULT_CA_NAME: &str = "ca";
pub const DEFAULT_SSL_NAME: &str = "ssl";
pub const DEFAULT_CA_COMMON_NAME: &str = "generated by trustcert";
pub const DEFAULT_KEY_BITS: u32 = 2048;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

const CONFIG_ENV: &str = "TRUSTCERT_CONFIG";
const APP_DIR: &str = "trustcert";

#[derive(Debug, Clone)]
pub struct TrustCertConfig {
    pub dir: PathBuf,
    pub ca_name: String,
    pub ssl_name: String,
    pub ca_common_name: String,
    pub key_bits: u32,
    pub command_timeout: Duration,
}

impl TrustCertConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ca_name: DEFAULT_CA_NAME.to_string(),
            ssl_name: DEFAULT_SSL_NAME.to_string(),
            ca_common_name: DEFAULT_CA_COMMON_NAME.to_string(),
            key_bits: DEFAULT_KEY_BITS,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Configuration rooted at the resolved per-user config directory.
    pub fn from_env() -> Result<Self, String> {
        get_config_dir().map(Self::new)
    }

    pub fn with_ca_name(mut self, name: impl Into<String>) -> Self {
        self.ca_name = name.into();
        self
    }

    pub fn with_ssl_name(mut self, name: impl Into<String>) -> Self {
        self.ssl_name = name.into();
        self
    }

    pub fn with_ca_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.ca_common_name = common_name.into();
        self
    }

    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn cert_path(&self, name: &str) -> PathBuf {
        cert_path(&self.dir, name)
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        key_path(&self.dir, name)
    }
}

pub fn cert_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.crt"))
}

pub fn key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.key"))
}

pub fn get_config_dir() -> Result<PathBuf, String> {
    resolve_config_dir(
        env::var_os(CONFIG_ENV).map(PathBuf::from),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        dirs::config_dir(),
        dirs::home_dir(),
    )
}

fn resolve_config_dir(
    override_dir: Option<PathBuf>, xdg_config_home: Option<PathBuf>,
    platform_config_dir: Option<PathBuf>, home_dir: Option<PathBuf>,
) -> Result<PathBuf, String> {
    if let Some(dir) = override_dir {
        return Ok(dir);
    }

    if let Some(mut path) = xdg_config_home {
        path.push(APP_DIR);
        return Ok(path);
    }

    if let Some(mut path) = platform_config_dir {
        path.push(APP_DIR);
        return Ok(path);
    }

    if let Some(mut path) = home_dir {
        path.push(format!(".{APP_DIR}"));
        return Ok(path);
    }

    Err("Unable to determine the configuration directory".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve_config_dir(
            Some(PathBuf::from("/custom/dir")),
            Some(PathBuf::from("/xdg")),
            Some(PathBuf::from("/config")),
            Some(PathBuf::from("/home/dev")),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/custom/dir"));
    }

    #[test]
    fn test_xdg_before_platform_dir() {
        let dir = resolve_config_dir(
            None,
            Some(PathBuf::from("/xdg")),
            Some(PathBuf::from("/config")),
            None,
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/trustcert"));
    }

    #[test]
    fn test_home_fallback() {
        let dir = resolve_config_dir(None, None, None, Some(PathBuf::from("/home/dev"))).unwrap();
        assert_eq!(dir, PathBuf::from("/home/dev/.trustcert"));

        assert!(resolve_config_dir(None, None, None, None).is_err());
    }

    #[test]
    fn test_file_layout() {
        let config = TrustCertConfig::new("/certs").with_ssl_name("dev");
        assert_eq!(config.cert_path(&config.ca_name), PathBuf::from("/certs/ca.crt"));
        assert_eq!(config.key_path(&config.ca_name), PathBuf::from("/certs/ca.key"));
        assert_eq!(config.cert_path(&config.ssl_name), PathBuf::from("/certs/dev.crt"));
        assert_eq!(config.key_path(&config.ssl_name), PathBuf::from("/certs/dev.key"));
    }
}
