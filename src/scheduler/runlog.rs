// src/scheduler/runlog.rs
//! Dated append-only run log: `<dir>/collect_YYYY-MM-DD.log`.

use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_for(&self, at: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("collect_{}.log", at.format("%Y-%m-%d")))
    }

    pub fn info(&self, msg: &str) {
        info!(target: "scheduler", "{msg}");
        self.write(Local::now(), msg, false);
    }

    pub fn error(&self, msg: &str) {
        error!(target: "scheduler", "{msg}");
        self.write(Local::now(), msg, true);
    }

    /// Failures to write are reported through tracing only.
    pub fn write(&self, at: DateTime<Local>, msg: &str, is_error: bool) {
        if let Err(e) = self.append(at, msg, is_error) {
            let dir = self.dir.display();
            error!(target: "scheduler", dir = %dir, error = %e, "run log write failed");
        }
    }

    fn append(&self, at: DateTime<Local>, msg: &str, is_error: bool) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(at))?;
        writeln!(f, "{}", format_line(at, msg, is_error))
    }
}

pub fn format_line(at: DateTime<Local>, msg: &str, is_error: bool) -> String {
    let prefix = if is_error { "ERROR: " } else { "" };
    format!("[{}] {prefix}{msg}", at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn appends_dated_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path());
        let at = Local.with_ymd_and_hms(2025, 4, 10, 8, 0, 0).unwrap();
        log.write(at, "starting scheduled collection", false);
        log.write(at, "store connection failed", true);

        let body = std::fs::read_to_string(dir.path().join("collect_2025-04-10.log")).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] starting scheduled collection"));
        assert!(lines[1].ends_with("] ERROR: store connection failed"));
    }
}
