//! Console and file logging.
//!
//! `tracing` events go to stdout and, when `[logging.file]` is set, to a
//! bounded log file. [`log_println!`](crate::log_println) writes plain
//! console lines (the banner, config notices) to both.

use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    prelude::*,
};

pub mod writer;

pub use writer::*;

use crate::configs::{Config, LogFileConfig};

static LOG_FILE: OnceLock<BoundedLogFile> = OnceLock::new();

#[macro_export]
macro_rules! log_println {
    () => {
        $crate::log_println!("")
    };
    ($($arg:tt)*) => {{
        let line = format!($($arg)*);
        std::println!("{}", line);
        $crate::common::logger::mirror_to_file(&line);
    }};
}

/// Copy one console line, minus colour codes, into the log file if any.
pub fn mirror_to_file(line: &str) {
    use std::io::Write;

    if let Some(mut file) = LOG_FILE.get().cloned() {
        let _ = writeln!(file, "{}", strip_ansi_escapes(line));
    }
}

/// Directive string for `EnvFilter` when `RUST_LOG` is unset.
pub fn filter_directives(config: &Config) -> String {
    let logging = config.logging.as_ref();
    let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
    let extra = logging
        .and_then(|l| l.filters.as_deref())
        .filter(|f| !f.is_empty());

    // symphonia reports every failed format guess
    match extra {
        Some(extra) => format!("{},symphonia=warn,{}", level, extra),
        None => format!("{},symphonia=warn", level),
    }
}

fn open_log_file(file: &LogFileConfig) -> BoundedLogFile {
    if let Some(dir) = Path::new(&file.path).parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("cannot create log directory {}: {}", dir.display(), e);
        }
    }
    LOG_FILE
        .get_or_init(|| BoundedLogFile::new(&file.path, file.max_lines as usize))
        .clone()
}

pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(false);

    let file = config
        .logging
        .as_ref()
        .and_then(|l| l.file.as_ref())
        .map(|f| {
            fmt::layer()
                .with_writer(open_log_file(f))
                .with_timer(LocalTime::rfc_3339())
                .with_thread_names(true)
                .with_line_number(true)
                .with_file(false)
                .with_ansi(false)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}
