// src/logging.rs
//
// Log lines tagged with the component that wrote them:
//
//   14:03:27.512 [serial] Opened /dev/ttyACM0 at 256000 baud (8N1)
//
// Every line goes to stderr. While a session log is open it is also
// appended to a file in the configured log directory.

use std::fmt;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StimError};
use crate::settings::ConsoleSettings;

/// Log a line under a component tag: `tlog!(serial: "Opened {}", port)`.
#[macro_export]
macro_rules! tlog {
    ($component:ident: $($arg:tt)+) => {
        $crate::logging::write_line(stringify!($component), format_args!($($arg)+))
    };
}

/// Always points at the newest session log (Unix only)
const LATEST_LINK: &str = "stimpulser.log";

struct SessionLog {
    path: PathBuf,
    file: File,
    lines: u64,
}

static SESSION_LOG: Mutex<Option<SessionLog>> = Mutex::new(None);

fn session() -> MutexGuard<'static, Option<SessionLog>> {
    SESSION_LOG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn format_line(component: &str, args: fmt::Arguments<'_>) -> String {
    format!(
        "{} [{}] {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        component,
        args
    )
}

#[doc(hidden)]
pub fn write_line(component: &str, args: fmt::Arguments<'_>) {
    let line = format_line(component, args);
    eprintln!("{}", line);
    if let Some(log) = session().as_mut() {
        if writeln!(log.file, "{}", line).is_ok() {
            log.lines += 1;
        }
    }
}

/// Open a session log in `settings.log_dir`.
/// Returns `None` without touching the filesystem when no directory is set.
pub fn init_file_logging(settings: &ConsoleSettings) -> Result<Option<PathBuf>> {
    match settings.log_dir.as_deref() {
        Some(dir) => open_session_log(Path::new(dir)).map(Some),
        None => Ok(None),
    }
}

/// Start `<dir>/YYYYmmdd-HHMMSS-stimpulser.log`, replacing any open session log.
pub fn open_session_log(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        StimError::LogFile(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let name = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-stimpulser.log")
        .to_string();
    let path = dir.join(&name);
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StimError::LogFile(format!("Failed to open {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    link_latest(dir, &name);

    let previous = session().replace(SessionLog {
        path: path.clone(),
        file,
        lines: 0,
    });
    if let Some(previous) = previous {
        tlog!(logging: "Previous log {} closed after {} lines", previous.path.display(), previous.lines);
    }
    tlog!(logging: "Session log started: {}", path.display());
    Ok(path)
}

#[cfg(unix)]
fn link_latest(dir: &Path, name: &str) {
    let link = dir.join(LATEST_LINK);
    let _ = std::fs::remove_file(&link);
    if let Err(e) = std::os::unix::fs::symlink(name, &link) {
        tlog!(logging: "Could not update {}: {}", link.display(), e);
    }
}

/// Close the session log. Returns its path if one was open.
pub fn stop_file_logging() -> Option<PathBuf> {
    let log = session().take()?;
    tlog!(logging: "Session log {} closed after {} lines", log.path.display(), log.lines);
    Some(log.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let line = format_line("serial", format_args!("Opened {} at {} baud", "/dev/ttyACM0", 256_000));
        let bytes = line.as_bytes();
        assert_eq!((bytes[2], bytes[5], bytes[8]), (b':', b':', b'.'));
        assert_eq!(&line[12..], " [serial] Opened /dev/ttyACM0 at 256000 baud");
    }

    #[test]
    fn test_no_log_dir_means_stderr_only() {
        let settings = ConsoleSettings::default();
        assert_eq!(init_file_logging(&settings).unwrap(), None);
    }

    #[test]
    fn test_session_log_follows_settings() {
        let dir = std::env::temp_dir().join(format!("stimpulser-log-{}", std::process::id()));
        let settings = ConsoleSettings {
            log_dir: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let path = init_file_logging(&settings).unwrap().expect("log dir is set");
        assert!(path.starts_with(&dir));
        assert!(path.to_string_lossy().ends_with("-stimpulser.log"));

        tlog!(test: "hello {}", 42);
        assert_eq!(stop_file_logging(), Some(path.clone()));
        assert_eq!(stop_file_logging(), None);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[logging] Session log started"));
        assert!(content.contains("[test] hello 42"));

        // Lines after stop only go to stderr
        tlog!(test: "after stop");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("after stop"));

        #[cfg(unix)]
        assert_eq!(std::fs::read_to_string(dir.join(LATEST_LINK)).unwrap(), content);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
