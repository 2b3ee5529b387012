use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::ConfigManager;

/// Size above which the log file is rotated to `ogresync.log.old`.
pub const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Initialize the logging system
///
/// Console output goes through `env_logger`, filtered by `RUST_LOG`
/// (default `info`):
/// - `RUST_LOG=error` - Only errors
/// - `RUST_LOG=debug` - Every git invocation as well
/// - `RUST_LOG=off` - Nothing on the console
///
/// A plain-text log file lives next to the configuration:
/// - Linux: ~/.config/ogresync/ogresync.log or $XDG_CONFIG_HOME/ogresync/ogresync.log
/// - macOS: ~/Library/Application Support/ogresync/ogresync.log
/// - Windows: %APPDATA%\ogresync\ogresync.log
pub fn init_logger() -> Result<()> {
    ConfigManager::ensure_config_dir()?;

    let default_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(default_level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // already initialized

    rotate_log_if_needed()?;
    log_to_file(&format!("ogresync started, log level {default_level:?}"))?;

    Ok(())
}

/// Append a timestamped line to the log file.
pub fn log_to_file(message: &str) -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rotate the log file once it exceeds [`MAX_LOG_SIZE`].
pub fn rotate_log_if_needed() -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;
    if !log_path.exists() {
        return Ok(());
    }

    if std::fs::metadata(&log_path)?.len() > MAX_LOG_SIZE {
        let old_log_path = log_path.with_extension("log.old");
        if old_log_path.exists() {
            std::fs::remove_file(&old_log_path)?;
        }
        std::fs::rename(&log_path, &old_log_path)?;
        log::info!("Log file rotated to {}", old_log_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_DIR_ENV;
    use serial_test::serial;
    use std::fs::File;
    use tempfile::TempDir;

    fn with_config_dir<F: FnOnce()>(f: F) {
        let temp = TempDir::new().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, temp.path());
        f();
        std::env::remove_var(CONFIG_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_init_logger_writes_log_file() {
        with_config_dir(|| {
            init_logger().unwrap();
            let contents = std::fs::read_to_string(ConfigManager::log_file_path().unwrap()).unwrap();
            assert!(contents.contains("ogresync started"));
        });
    }

    #[test]
    #[serial]
    fn test_log_to_file_appends() {
        with_config_dir(|| {
            log_to_file("first").unwrap();
            log_to_file("second").unwrap();
            let contents = std::fs::read_to_string(ConfigManager::log_file_path().unwrap()).unwrap();
            assert!(contents.find("first").unwrap() < contents.find("second").unwrap());
        });
    }

    #[test]
    #[serial]
    fn test_rotate_log_creates_backup() {
        with_config_dir(|| {
            let log_path = ConfigManager::log_file_path().unwrap();
            let mut file = File::create(&log_path).unwrap();
            file.write_all(&vec![b'a'; (MAX_LOG_SIZE + 1) as usize])
                .unwrap();
            drop(file);

            rotate_log_if_needed().unwrap();

            assert!(log_path.with_extension("log.old").exists());
            assert!(!log_path.exists());
        });
    }
}
