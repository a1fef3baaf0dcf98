//! Minimal logger.
//!
//! The logger prints `[elapsed LEVEL target] message` to stderr. Records
//! from the `stereo_recon*` crates pass at the configured level; everything
//! else (codecs, detectors, the thread pool) is held to a quieter
//! `dependency_level`. Use [`init`] or [`init_with_level`] once at startup;
//! library code only emits through the `log` macros.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefix shared by every crate of the workspace.
const OWN_TARGET: &str = "stereo_recon";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Level for the `stereo_recon*` targets.
    pub level: LevelFilter,
    /// Level for all other targets.
    pub dependency_level: LevelFilter,
}

impl LogConfig {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            dependency_level: LevelFilter::Warn,
        }
    }

    fn filter_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_TARGET) {
            self.level
        } else {
            self.dependency_level
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.level.max(self.dependency_level)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LevelFilter::Info)
    }
}

/// "stereo_recon_calib::stereo" -> "calib::stereo"
fn short_target(target: &str) -> &str {
    target.strip_prefix("stereo_recon_").unwrap_or(target)
}

struct StderrLogger {
    config: LogConfig,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.config.filter_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init(config: LogConfig) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            config,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(config.max_level());
    }
    Ok(())
}

/// [`init`] with `level` for the workspace and warnings for dependencies.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init(LogConfig::new(level))
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, or by `config`
/// when it is unset, reporting span durations on close.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, config: LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},{}={}",
            config.dependency_level.as_str().to_ascii_lowercase(),
            OWN_TARGET,
            config.level.as_str().to_ascii_lowercase()
        ))
    });
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn enabled(logger: &StderrLogger, level: Level, target: &str) -> bool {
        logger.enabled(&Metadata::builder().level(level).target(target).build())
    }

    #[test]
    fn dependencies_are_held_to_their_own_level() {
        let logger = StderrLogger {
            config: LogConfig::new(LevelFilter::Debug),
            started: Instant::now(),
        };
        assert!(enabled(&logger, Level::Debug, "stereo_recon_calib::stereo"));
        assert!(enabled(&logger, Level::Debug, "stereo_recon"));
        assert!(!enabled(&logger, Level::Trace, "stereo_recon_disparity::sgm"));
        assert!(!enabled(&logger, Level::Info, "chess_corners::detect"));
        assert!(enabled(&logger, Level::Warn, "image::codecs::png"));
    }

    #[test]
    fn max_level_covers_both_filters() {
        let quiet = LogConfig::new(LevelFilter::Error);
        assert_eq!(quiet.max_level(), LevelFilter::Warn);
        let chatty = LogConfig {
            level: LevelFilter::Info,
            dependency_level: LevelFilter::Trace,
        };
        assert_eq!(chatty.max_level(), LevelFilter::Trace);
        assert_eq!(LogConfig::default().level, LevelFilter::Info);
    }

    #[test]
    fn workspace_prefix_is_shortened() {
        assert_eq!(short_target("stereo_recon_calib::stereo"), "calib::stereo");
        assert_eq!(short_target("stereo_recon::io"), "stereo_recon::io");
        assert_eq!(short_target("rayon_core"), "rayon_core");
    }
}
