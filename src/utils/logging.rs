//! Logging Module
//!
//! Structured logging built on the `tracing` crate, plus a small helper that
//! reports per-epoch timing for the training phases.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Per-phase epoch timer
pub struct EpochTimer {
    phase: &'static str,
    total_epochs: usize,
    epoch_start: Instant,
    phase_start: Instant,
}

impl EpochTimer {
    /// Create a timer for a phase running `total_epochs` epochs
    pub fn new(phase: &'static str, total_epochs: usize) -> Self {
        Self {
            phase,
            total_epochs,
            epoch_start: Instant::now(),
            phase_start: Instant::now(),
        }
    }

    /// Mark the start of an epoch
    pub fn start_epoch(&mut self) {
        self.epoch_start = Instant::now();
    }

    /// Seconds spent in the current epoch
    pub fn epoch_secs(&self) -> f64 {
        self.epoch_start.elapsed().as_secs_f64()
    }

    /// Log phase completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: {} epochs finished in {}",
            self.phase,
            self.total_epochs,
            super::format_duration(self.phase_start.elapsed().as_secs_f64())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert!(LogConfig::verbose().include_target);
    }
}
