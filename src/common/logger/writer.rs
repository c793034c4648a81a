use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

/// Drop CSI colour sequences (`ESC [ ... final`) from console text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
        }
        for c in chars.by_ref() {
            if ('\x40'..='\x7e').contains(&c) {
                break;
            }
        }
    }
    out
}

struct LogFile {
    path: PathBuf,
    max_lines: usize,
    handle: Option<File>,
    /// Lines appended since the last trim.
    grown: usize,
}

impl LogFile {
    fn handle(&mut self) -> io::Result<&mut File> {
        let file = match self.handle.take() {
            Some(f) => f,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        Ok(self.handle.insert(file))
    }

    /// Rewrite the file keeping only the newest `max_lines` lines.
    fn trim(&mut self) -> io::Result<()> {
        self.handle = None;

        let contents = fs::read_to_string(&self.path)?;
        let total = contents.lines().count();
        if total <= self.max_lines {
            return Ok(());
        }

        let mut kept = String::with_capacity(contents.len());
        for line in contents.lines().skip(total - self.max_lines) {
            kept.push_str(line);
            kept.push('\n');
        }
        fs::write(&self.path, kept)
    }
}

/// Log file bounded to roughly `max_lines` lines.
///
/// Appends go through one shared handle; after a tenth of the budget (at
/// least 50 lines) has been written the file is cut back to the newest
/// `max_lines`.
#[derive(Clone)]
pub struct BoundedLogFile {
    inner: Arc<Mutex<LogFile>>,
}

impl BoundedLogFile {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogFile {
                path: path.into(),
                max_lines: max_lines.max(1),
                handle: None,
                grown: 0,
            })),
        }
    }
}

impl Write for BoundedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self.inner.lock();
        log.handle()?.write_all(buf)?;

        log.grown += buf.iter().filter(|&&b| b == b'\n').count();
        let slack = (log.max_lines / 10).max(50);
        if log.grown >= slack {
            log.grown = 0;
            if let Err(e) = log.trim() {
                eprintln!("failed to trim {}: {}", log.path.display(), e);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock().handle {
            Some(ref mut f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BoundedLogFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_codes() {
        assert_eq!(strip_ansi_escapes("\x1b[32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi_escapes("\x1b[1;36mbold\x1b[0m"), "bold");
    }

    #[test]
    fn keeps_newest_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.log");
        let mut log = BoundedLogFile::new(&path, 20);

        for i in 0..120 {
            writeln!(log, "line {}", i).unwrap();
        }
        log.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines.len() <= 70, "got {} lines", lines.len());
        assert_eq!(*lines.last().unwrap(), "line 119");
    }
}
