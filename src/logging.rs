//! Logging setup.
//!
//! Uses the `log` facade with `env_logger` backends. The console level comes
//! from, in priority order:
//!
//! 1. `RUST_LOG` (if set)
//! 2. `--quiet` (errors only) or `-v` / `-vv` (debug / trace)
//! 3. Default: info
//!
//! Every line carries a UTC timestamp and the level. Debug and trace output
//! also include the module path. Log lines go to stderr so they do not
//! interleave with report output redirected from stdout.
//!
//! Warnings and errors are also appended to a persistent error log
//! (`errors.log` beside the cache by default) whatever the console level, so
//! a quiet run still leaves a record of every file that failed.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Logger, Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};

/// Level persisted to the error log.
pub const ERROR_LOG_LEVEL: LevelFilter = LevelFilter::Warn;

/// Sends each record to the console logger and, when one is open, the error
/// log. Each side applies its own filter.
struct TeeLogger {
    console: Logger,
    file: Option<Logger>,
}

impl TeeLogger {
    fn max_level(&self) -> LevelFilter {
        let file = self.file.as_ref().map_or(LevelFilter::Off, Logger::filter);
        self.console.filter().max(file)
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata) || self.file.as_ref().is_some_and(|f| f.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        self.console.log(record);
        if let Some(file) = &self.file {
            file.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            file.flush();
        }
    }
}

/// Initialize logging from CLI verbosity flags, appending warnings and
/// errors to `error_log` when given.
///
/// Call once at startup. Later calls are ignored, which keeps integration
/// tests that run the app several times in one process working.
pub fn init_logging(verbose: u8, quiet: bool, error_log: Option<&Path>) {
    let from_env = env::var("RUST_LOG").is_ok();
    let console = console_logger(verbose, quiet, from_env);

    let mut open_error = None;
    let file = error_log.and_then(|path| match open_error_log(path) {
        Ok(file) => Some(file_logger(file)),
        Err(e) => {
            open_error = Some((path, e));
            None
        }
    });

    let tee = TeeLogger { console, file };
    let max_level = tee.max_level();
    if log::set_boxed_logger(Box::new(tee)).is_err() {
        return;
    }
    log::set_max_level(max_level);

    log::debug!(
        "Logging initialized at level {} ({})",
        current_level_name(),
        if from_env { "RUST_LOG" } else { "flags" }
    );
    match (error_log, open_error) {
        (_, Some((path, e))) => {
            log::warn!("Cannot open error log {}: {}", path.display(), e);
        }
        (Some(path), None) => log::debug!("Appending warnings to {}", path.display()),
        (None, None) => {}
    }
}

fn console_logger(verbose: u8, quiet: bool, from_env: bool) -> Logger {
    let mut builder = Builder::new();
    builder.target(Target::Stderr);

    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    let with_module = verbose >= 1;
    builder.format(move |buf, record| {
        let timestamp = buf.timestamp_millis();
        let level = record.level();
        let style = buf.default_level_style(level);
        if with_module {
            writeln!(
                buf,
                "{timestamp} {style}{level:<5}{style:#} [{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(buf, "{timestamp} {style}{level:<5}{style:#} {}", record.args())
        }
    });
    builder.build()
}

fn open_error_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_logger(file: File) -> Logger {
    let mut builder = Builder::new();
    builder
        .target(Target::Pipe(Box::new(file)))
        .write_style(WriteStyle::Never)
        .filter_level(ERROR_LOG_LEVEL)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        });
    builder.build()
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Name of the maximum enabled log level.
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use tempfile::TempDir;

    #[test]
    fn test_determine_level() {
        assert_eq!(determine_level(0, false), LevelFilter::Info);
        assert_eq!(determine_level(1, false), LevelFilter::Debug);
        assert_eq!(determine_level(2, false), LevelFilter::Trace);
        assert_eq!(determine_level(5, false), LevelFilter::Trace);
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        assert_eq!(determine_level(0, true), LevelFilter::Error);
        assert_eq!(determine_level(2, true), LevelFilter::Error);
    }

    #[test]
    fn test_error_log_keeps_warnings_under_quiet_console() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/errors.log");
        let tee = TeeLogger {
            console: console_logger(0, true, false),
            file: Some(file_logger(open_error_log(&path).unwrap())),
        };

        tee.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("Decode error for broken.flac"))
                .build(),
        );
        tee.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("Found 3 audio files"))
                .build(),
        );
        tee.flush();

        let logged = fs::read_to_string(&path).unwrap();
        assert!(logged.contains("WARN  Decode error for broken.flac"), "{logged}");
        assert!(!logged.contains("Found 3 audio files"));
        assert_eq!(tee.max_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(0, true, None);
        init_logging(2, false, None);
        assert!(["off", "error", "warn", "info", "debug", "trace"].contains(&current_level_name()));
    }
}
