use std::fs::OpenOptions;
use std::io;

use super::config::LogConfig;

pub trait LoggerInitializer {
    fn initialize(&self, config: &LogConfig) -> Result<(), Box<dyn std::error::Error>>;
}

/// Appends plain log lines to the configured file.
pub struct FileLoggerInitializer;

impl LoggerInitializer for FileLoggerInitializer {
    fn initialize(&self, config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
        let path = config.file_path().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "No file path configured")
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        env_logger::Builder::new()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .filter_level(config.level)
            .try_init()?;

        Ok(())
    }
}

pub struct StderrLoggerInitializer;

impl LoggerInitializer for StderrLoggerInitializer {
    fn initialize(&self, config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::new()
            .target(env_logger::Target::Stderr)
            .filter_level(config.level)
            .format_timestamp(None)
            .format_module_path(false)
            .try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_initializer_requires_path() {
        let result = FileLoggerInitializer.initialize(&LogConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_file_initializer_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("trustcert.log");
        let config = LogConfig::new(log::LevelFilter::Info).with_file_output(path.clone());

        // Another test may already own the global logger; the file must
        // exist either way.
        let _ = FileLoggerInitializer.initialize(&config);
        assert!(path.exists());
    }
}
