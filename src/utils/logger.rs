//! `log4rs`-backed logging setup, generalized from a single hard-coded
//! config file into a small set of programmatic entry points plus an
//! environment-driven one for embedding applications that don't want to
//! ship their own `log4rs.yaml`.

use std::path::{Path, PathBuf};

/// Initializes logging from `log4rs.yaml` in the working directory, if
/// present. Silently does nothing if the file is missing or malformed;
/// prefer [`configure_logging`] for programmatic control.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let _ = log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default());
    Ok(())
}

/// Initializes logging from a specific config file path.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Configures a rolling-file logger under `dir` (current directory if
/// `None`) at `level` (`error`|`warn`|`info`|`debug`|`trace`, default
/// `info`), keeping `retention` rolled files (default 7).
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<usize>) {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let keep = retention.unwrap_or(7) as u32;
    let lvl = match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    let pattern = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
    let Ok(roller) = FixedWindowRoller::builder()
        .build(&format!("{}", base.join("tricache.{}.log").display()), keep)
    else {
        return;
    };
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let Ok(appender) = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(base.join("tricache.log"), Box::new(policy))
    else {
        return;
    };
    let Ok(config) = Config::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(lvl))
    else {
        return;
    };
    let _ = log4rs::init_config(config);
}

/// Configures logging from environment variables, if present:
/// `TRICACHE_LOG_DIR`, `TRICACHE_LOG_LEVEL`, `TRICACHE_LOG_RETENTION`.
pub fn configure_from_env() {
    let dir = std::env::var("TRICACHE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("TRICACHE_LOG_LEVEL").ok();
    let retention =
        std::env::var("TRICACHE_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention);
}
