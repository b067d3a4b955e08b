//! Shared logging and home-directory helpers for room service binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "roomservice=info,roomservice_core=info,roomservice_dialog=info";
const HOME_ENV: &str = "ROOMSERVICE_HOME";
const HOME_DIR_NAME: &str = ".roomservice";

/// Logging configuration shared by room service binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Interactive chat owns the terminal; only warnings reach stderr.
    pub interactive: bool,
}

/// Size-based rotation for the log file.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub max_files: usize,
    pub max_bytes: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Initialize tracing with a rotating file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedRotatingWriter::open(&log_dir, config.app_name, RotationPolicy::default())
        .context("Failed to initialize rotating log writer")?;
    let log_path = file_writer.path();

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new(format!("{},roomservice_core=debug", DEFAULT_LOG_FILTER))
    } else if config.interactive {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(log_path)
}

/// Get the room service home directory: ~/.roomservice
///
/// `ROOMSERVICE_HOME` overrides the location. Without a resolvable home
/// directory the working directory is used.
pub fn roomservice_home() -> PathBuf {
    resolve_home(std::env::var(HOME_ENV).ok(), dirs::home_dir())
}

fn resolve_home(override_path: Option<String>, user_home: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    user_home
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR_NAME)
}

/// Get the config file path: ~/.roomservice/config.toml
pub fn config_path() -> PathBuf {
    roomservice_home().join("config.toml")
}

/// Get the logs directory: ~/.roomservice/logs
pub fn logs_dir() -> PathBuf {
    roomservice_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

struct RotatingFile {
    dir: PathBuf,
    stem: String,
    policy: RotationPolicy,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    fn open(dir: &Path, app_name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut rotating = Self {
            dir: dir.to_path_buf(),
            stem: sanitize_name(app_name),
            policy: RotationPolicy {
                max_files: policy.max_files.max(1),
                max_bytes: policy.max_bytes,
            },
            file: None,
            written: 0,
        };
        rotating.reopen()?;
        if rotating.written > rotating.policy.max_bytes {
            rotating.rotate()?;
        }
        Ok(rotating)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn archive_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift `app.log.N` to `app.log.N+1`, dropping the oldest, then start a
    /// fresh `app.log`.
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.policy.max_files.saturating_sub(1);
        if oldest > 0 {
            let doomed = self.archive_path(oldest);
            if doomed.exists() {
                fs::remove_file(&doomed)?;
            }
            for generation in (1..oldest).rev() {
                let from = self.archive_path(generation);
                if from.exists() {
                    fs::rename(&from, self.archive_path(generation + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(active, self.archive_path(1))?;
            }
        } else {
            File::create(self.active_path())?;
        }

        self.reopen()
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_bytes {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedRotatingWriter {
    inner: Arc<Mutex<RotatingFile>>,
    path: PathBuf,
}

impl SharedRotatingWriter {
    fn open(dir: &Path, app_name: &str, policy: RotationPolicy) -> Result<Self> {
        let rotating = RotatingFile::open(dir, app_name, policy)
            .with_context(|| format!("Failed to open log file for {}", app_name))?;
        let path = rotating.active_path();
        Ok(Self {
            inner: Arc::new(Mutex::new(rotating)),
            path,
        })
    }

    fn path(&self) -> PathBuf {
        self.path.clone()
    }
}

struct SharedRotatingWriterGuard {
    inner: Arc<Mutex<RotatingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRotatingWriter {
    type Writer = SharedRotatingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRotatingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedRotatingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "roomservice".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_home_override_wins() {
        let home = resolve_home(Some("/srv/roomservice".into()), Some(PathBuf::from("/home/guest")));
        assert_eq!(home, PathBuf::from("/srv/roomservice"));
    }

    #[test]
    fn test_home_defaults_under_user_home() {
        let home = resolve_home(None, Some(PathBuf::from("/home/guest")));
        assert_eq!(home, PathBuf::from("/home/guest/.roomservice"));

        let blank = resolve_home(Some("  ".into()), Some(PathBuf::from("/home/guest")));
        assert_eq!(blank, PathBuf::from("/home/guest/.roomservice"));
    }

    #[test]
    fn test_home_without_user_home_uses_cwd() {
        assert_eq!(resolve_home(None, None), PathBuf::from("./.roomservice"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("room service/chat"), "room_service_chat");
        assert_eq!(sanitize_name(""), "roomservice");
    }

    #[test]
    fn test_rotation_keeps_bounded_generations() {
        let temp = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_files: 3,
            max_bytes: 16,
        };
        let mut file = RotatingFile::open(temp.path(), "chat", policy).unwrap();
        for line in ["aaaaaaaaaaaa\n", "bbbbbbbbbbbb\n", "cccccccccccc\n", "dddddddddddd\n"] {
            file.write_all(line.as_bytes()).unwrap();
        }
        file.flush().unwrap();

        let active = fs::read_to_string(temp.path().join("chat.log")).unwrap();
        assert_eq!(active, "dddddddddddd\n");
        assert_eq!(
            fs::read_to_string(temp.path().join("chat.log.1")).unwrap(),
            "cccccccccccc\n"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("chat.log.2")).unwrap(),
            "bbbbbbbbbbbb\n"
        );
        assert!(!temp.path().join("chat.log.3").exists());
    }

    #[test]
    fn test_single_generation_truncates_in_place() {
        let temp = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_files: 1,
            max_bytes: 8,
        };
        let mut file = RotatingFile::open(temp.path(), "chat", policy).unwrap();
        file.write_all(b"first\n").unwrap();
        file.write_all(b"second\n").unwrap();
        file.flush().unwrap();
        let active = fs::read_to_string(temp.path().join("chat.log")).unwrap();
        assert_eq!(active, "second\n");
        assert!(!temp.path().join("chat.log.1").exists());
    }
}
