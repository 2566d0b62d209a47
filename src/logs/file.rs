use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use super::sink::{LogSink, ScriptLogLine};

/// Appends script lines to one file per module: `<dir>/<module stem>.log`.
///
/// Files are opened lazily and kept open. Write failures are reported through
/// `tracing` and otherwise ignored.
#[derive(Debug)]
pub struct FileLogSink {
    dir: PathBuf,
    files: Mutex<HashMap<PathBuf, File>>,
}

impl FileLogSink {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Log file used for a module path.
    pub fn file_for(&self, module: &str) -> PathBuf {
        let stem = Path::new(module)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "engine".to_string());
        self.dir.join(format!("{stem}.log"))
    }

    fn append(&self, target: PathBuf, text: &str) -> io::Result<()> {
        let mut files = self.files.lock();
        let file = match files.entry(target) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let f = OpenOptions::new().create(true).append(true).open(e.key())?;
                e.insert(f)
            }
        };
        file.write_all(text.as_bytes())
    }
}

impl LogSink for FileLogSink {
    fn write(&self, line: &ScriptLogLine) {
        let mut text = line.render();
        text.push('\n');
        if let Some(bt) = &line.backtrace {
            text.push_str(bt);
            if !bt.ends_with('\n') {
                text.push('\n');
            }
        }
        let target = self.file_for(&line.module);
        if let Err(e) = self.append(target.clone(), &text) {
            warn!(path = %target.display(), error = %e, "cannot write script log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogLevel;

    #[test]
    fn appends_lines_per_module() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path().join("logs")).unwrap();

        sink.write(&ScriptLogLine::new("rules/hall.rule".into(), "hall #1".into(), LogLevel::Log, "on"));
        sink.write(
            &ScriptLogLine::new("rules/hall.rule".into(), "hall #1".into(), LogLevel::Error, "boom")
                .with_backtrace(Some("at frame 0".into())),
        );

        let text = fs::read_to_string(dir.path().join("logs").join("hall.log")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[LOG] hall #1: on"));
        assert!(lines[1].ends_with("[ERROR] hall #1: boom"));
        assert_eq!(lines[2], "at frame 0");
    }
}
