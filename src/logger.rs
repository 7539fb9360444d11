use crate::config::LoggingConfig;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const ENC_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

static HANDLE: OnceLock<log4rs::Handle> = OnceLock::new();

type LogResult = Result<(), Box<dyn std::error::Error>>;

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENC_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

/// Configure logging globally for the process. Later calls replace the active config.
/// - dir: base directory for logs; if None, current directory.
/// - level: error|warn|info|debug|trace|off
/// - retention: number of rolled files to keep (default 7)
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender fails to build.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<usize>) -> LogResult {
    configure_logging_with_dev(dir, level, retention, false)
}

/// Like [`configure_logging`], additionally persisting `dev6!` lines to `dev6.log`.
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender fails to build.
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> LogResult {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)))
        .logger(
            Logger::builder()
                .appender("metrics")
                .additive(false)
                .build("nexuslite_repository::metrics", lvl),
        );

    if enable_dev6 {
        builder = builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build("nexuslite_repository::dev6", LevelFilter::Trace),
            );
    } else {
        builder = builder.logger(
            Logger::builder().additive(false).build("nexuslite_repository::dev6", LevelFilter::Off),
        );
    }

    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config)?;
    let _ = HANDLE.set(handle);
    Ok(())
}

/// Apply a `[logging]` section from a repository config file.
///
/// # Errors
/// See [`configure_logging_with_dev`].
pub fn configure_from_config(cfg: &LoggingConfig) -> LogResult {
    configure_logging_with_dev(cfg.dir.as_deref(), cfg.level.as_deref(), cfg.retention, cfg.dev6)
}

/// Configure logging from environment variables if present:
/// - NEXUSREPO_LOG_DIR
/// - NEXUSREPO_LOG_LEVEL
/// - NEXUSREPO_LOG_RETENTION
/// - NEXUSREPO_DEV6
///
/// # Errors
/// See [`configure_logging_with_dev`].
pub fn configure_from_env() -> LogResult {
    let dir = std::env::var("NEXUSREPO_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("NEXUSREPO_LOG_LEVEL").ok();
    let retention =
        std::env::var("NEXUSREPO_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let dev6_enabled = std::env::var("NEXUSREPO_DEV6")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging_with_dev(dir.as_deref(), level.as_deref(), retention, dev6_enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level(Some("WARN")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("trace")), LevelFilter::Trace);
        assert_eq!(parse_level(Some("bogus")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }

    #[test]
    fn configure_creates_log_files() {
        let dir = tempfile::tempdir().unwrap();
        configure_logging(Some(dir.path()), Some("debug"), Some(2)).unwrap();
        log::info!("logger smoke line");
        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("metrics.log").exists());
    }
}
