pub mod config;
pub mod documents;
pub mod mcp_client;
pub mod services;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Return the platform-standard data directory for docmcp.
///
/// - macOS: `~/Library/Application Support/docmcp/`
/// - Windows: `{FOLDERID_RoamingAppData}\docmcp\`
/// - Linux: `$XDG_DATA_HOME/docmcp/` (fallback `~/.local/share/docmcp/`)
///
/// Falls back to `~/.docmcp/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("docmcp");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docmcp")
}

/// Log file generations kept next to the live `docmcp.log`.
const KEPT_LOGS: u32 = 3;

/// Initialize the tracing subscriber, writing structured logs to the data directory.
///
/// The previous run's log is shifted to `docmcp.log.1` (up to
/// [`KEPT_LOGS`] generations) and a fresh file is opened. If that fails,
/// logs go to stderr instead.
pub fn init_tracing() {
    let log_dir = data_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let log_path = log_dir.join("docmcp.log");
    let rotated = rotate_logs(&log_path, KEPT_LOGS);

    let opened = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path);

    match opened {
        Ok(file) => {
            let _ = tracing::subscriber::set_global_default(file_subscriber(file, env_filter()));
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .with_target(true)
                .try_init();
            tracing::warn!(path = %log_path.display(), error = %e, "failed to open log file");
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        rotated,
        pid = std::process::id(),
        "=== docmcp starting ==="
    );
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docmcp=info,warn"))
}

/// Plain-text subscriber over `file`. `File` is unbuffered and each event is
/// written in one call, so lines reach disk as they are logged.
fn file_subscriber(
    file: File,
    filter: tracing_subscriber::EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .finish()
}

/// `docmcp.log` → `docmcp.log.<generation>`.
fn numbered(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shift `base` and its numbered copies up one generation, dropping
/// whatever falls past `keep`. Returns how many files moved.
fn rotate_logs(base: &Path, keep: u32) -> usize {
    if keep == 0 {
        return usize::from(std::fs::remove_file(base).is_ok());
    }
    let _ = std::fs::remove_file(numbered(base, keep));

    (0..keep)
        .rev()
        .filter(|&generation| {
            let from = if generation == 0 {
                base.to_path_buf()
            } else {
                numbered(base, generation)
            };
            std::fs::rename(from, numbered(base, generation + 1)).is_ok()
        })
        .count()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_is_app_specific() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name == "docmcp" || name == ".docmcp");
    }

    #[test]
    fn test_rotate_logs_keeps_last_three() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("docmcp.log");

        for generation in 0..5 {
            std::fs::write(&base, format!("run {generation}")).unwrap();
            rotate_logs(&base, 3);
        }

        assert!(!base.exists());
        let read = |generation| std::fs::read_to_string(numbered(&base, generation)).unwrap();
        assert_eq!(read(1), "run 4");
        assert_eq!(read(2), "run 3");
        assert_eq!(read(3), "run 2");
        assert!(!numbered(&base, 4).exists());
    }

    #[test]
    fn test_rotate_logs_counts_moved_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("docmcp.log");

        assert_eq!(rotate_logs(&base, 3), 0);
        std::fs::write(&base, "first").unwrap();
        assert_eq!(rotate_logs(&base, 3), 1);
        std::fs::write(&base, "second").unwrap();
        assert_eq!(rotate_logs(&base, 3), 2);
    }

    #[test]
    fn test_numbered_appends_generation() {
        let base = Path::new("/var/log/docmcp.log");
        assert_eq!(numbered(base, 2), PathBuf::from("/var/log/docmcp.log.2"));
    }

    #[test]
    fn test_file_subscriber_writes_each_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docmcp.log");
        let file = File::create(&path).unwrap();

        let subscriber = file_subscriber(file, tracing_subscriber::EnvFilter::new("info"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(server = "Doc", "registered MCP server");
            tracing::debug!("filtered out");
        });

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("registered MCP server"));
        assert!(written.contains("server=\"Doc\""));
        assert!(!written.contains('\u{1b}'));
    }
}
