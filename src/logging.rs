use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use crate::config::LoggingConfig;

/// Parse a configured level name. Unknown names fall back to `warn`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" | "none" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

/// Install the process logger from configuration: append to the configured
/// file (`~` expanded), or log to stderr when no file is set.
/// Best-effort: failures are silently ignored (logging must never block a command).
pub fn init(config: &LoggingConfig) {
    let level = level_filter(&config.level);
    if level == LevelFilter::Off {
        return;
    }

    if !config.file.is_empty() {
        let path = std::path::PathBuf::from(shellexpand::tilde(&config.file).as_ref());
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            let _ = WriteLogger::init(level, Config::default(), file);
            return;
        }
    }

    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels() {
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter(" INFO "), LevelFilter::Info);
        assert_eq!(level_filter("warning"), LevelFilter::Warn);
        assert_eq!(level_filter("off"), LevelFilter::Off);
    }

    #[test]
    fn unknown_level_is_warn() {
        assert_eq!(level_filter("loud"), LevelFilter::Warn);
        assert_eq!(level_filter(""), LevelFilter::Warn);
    }
}
