// log4rs setup: console plus a timestamped file under the configured log dir

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use merge_control_config::Settings;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";

/// Build the log4rs config for `settings` and return it with the log file path.
pub fn build_config(settings: &Settings) -> anyhow::Result<(Config, PathBuf)> {
    std::fs::create_dir_all(&settings.log_dir)?;
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    let log_path = settings.log_dir.join(format!("{timestamp}.log"));

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(&log_path)?;
    let console_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(parse_level(&settings.log_level)),
        )?;

    Ok((config, log_path))
}

/// Install the global logger. Can only succeed once per process.
pub fn init_logging(settings: &Settings) -> anyhow::Result<PathBuf> {
    let (config, log_path) = build_config(settings)?;
    log4rs::init_config(config)?;
    Ok(log_path)
}

/// Unknown level names fall back to `info`.
fn parse_level(raw: &str) -> LevelFilter {
    LevelFilter::from_str(raw.trim()).unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn test_build_config_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            log_dir: dir.path().join("logs"),
            log_level: "debug".to_string(),
            ..Settings::default()
        };

        let (config, log_path) = build_config(&settings).unwrap();
        assert_eq!(config.root().level(), LevelFilter::Debug);
        assert!(log_path.starts_with(&settings.log_dir));
        assert!(log_path.is_file());
    }
}
