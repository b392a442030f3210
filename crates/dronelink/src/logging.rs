use std::ffi::OsString;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Log line encoding on stderr.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Minimum level written to stderr.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// The `--log-format`/`--log-level` flags that reproduce these settings in a
/// child process.
pub fn forward_args(format: LogFormat, level: LogLevel) -> Vec<OsString> {
    let mut args = Vec::with_capacity(4);
    if let Some(value) = format.to_possible_value() {
        args.push("--log-format".into());
        args.push(value.get_name().into());
    }
    if let Some(value) = level.to_possible_value() {
        args.push("--log-level".into());
        args.push(value.get_name().into());
    }
    args
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::from(level))
        .with_ansi(false)
        .with_target(false);

    // A second init (tests) keeps the first subscriber.
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_flags_parse_back() {
        for &format in LogFormat::value_variants() {
            for &level in LogLevel::value_variants() {
                let args: Vec<String> = forward_args(format, level)
                    .into_iter()
                    .map(|a| a.into_string().unwrap())
                    .collect();
                assert_eq!(args.len(), 4);
                assert_eq!(LogFormat::from_str(&args[1], false).unwrap(), format);
                assert_eq!(LogLevel::from_str(&args[3], false).unwrap(), level);
            }
        }
    }

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
