//! Newer-release check raced against a short deadline.
//!
//! The check runs on a detached thread. If it has not reported back by the
//! deadline the main flow moves on and the late result is dropped with the
//! channel; the in-flight request is never cancelled.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use directories::ProjectDirs;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::shell::Shell;

/// How long the main flow waits for the check.
pub const CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Cached answers are reused for this long.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Latest release endpoint.
const LATEST_RELEASE_URL: &str = "https://api.github.com/repos/runway-dev/runway/releases/latest";

/// Set to skip the check entirely (used inside builder containers).
pub const DISABLE_ENV: &str = "RUNWAY_NO_UPDATE_CHECK";

/// Outcome of a raced check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// A newer release exists.
    Available { current: Version, latest: Version },
    UpToDate,
    Failed(String),
    TimedOut,
}

/// Run `check` on a background thread and wait at most `timeout` for it.
pub fn race<F>(timeout: Duration, check: F) -> UpdateCheck
where
    F: FnOnce() -> Result<Option<(Version, Version)>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        // The receiver may be gone after a timeout.
        let _ = tx.send(check());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(Some((current, latest)))) => UpdateCheck::Available { current, latest },
        Ok(Ok(None)) => UpdateCheck::UpToDate,
        Ok(Err(e)) => UpdateCheck::Failed(e.to_string()),
        Err(_) => UpdateCheck::TimedOut,
    }
}

/// Check for a newer release and report the outcome on the shell.
pub fn check_for_updates(shell: &Shell) {
    if std::env::var_os(DISABLE_ENV).is_some() {
        return;
    }

    match race(CHECK_TIMEOUT, || latest_release(cache_file().as_deref())) {
        UpdateCheck::Available { current, latest } => {
            shell.note(format!("an upgrade for runway is available: {current} -> {latest}"))
        }
        UpdateCheck::UpToDate => {}
        UpdateCheck::Failed(msg) => tracing::debug!("failed to check for latest version: {msg}"),
        UpdateCheck::TimedOut => shell.verbose("failed to check for latest version due to timeout"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedRelease {
    checked_at: u64,
    latest: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

fn cache_file() -> Option<PathBuf> {
    ProjectDirs::from("dev", "runway", "runway").map(|d| d.cache_dir().join("latest_release.json"))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Returns `(current, latest)` when `latest` is newer than this build.
fn latest_release(cache: Option<&Path>) -> Result<Option<(Version, Version)>> {
    let current = parse_version(env!("CARGO_PKG_VERSION"))?;
    let latest = match cache.and_then(read_cache) {
        Some(latest) => latest,
        None => {
            let latest = fetch_latest()?;
            if let Some(path) = cache {
                write_cache(path, &latest);
            }
            latest
        }
    };

    let latest = parse_version(&latest)?;
    Ok(newer(current, latest))
}

fn newer(current: Version, latest: Version) -> Option<(Version, Version)> {
    (latest > current).then_some((current, latest))
}

fn parse_version(raw: &str) -> Result<Version> {
    Version::parse(raw.trim_start_matches('v')).map_err(|e| Error::Target {
        target: "update check",
        message: format!("invalid version `{raw}`: {e}"),
    })
}

fn fetch_latest() -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("runway/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let release: Release = client
        .get(LATEST_RELEASE_URL)
        .send()?
        .error_for_status()?
        .json()?;
    Ok(release.tag_name)
}

fn read_cache(path: &Path) -> Option<String> {
    let data = std::fs::read(path).ok()?;
    let cached: CachedRelease = serde_json::from_slice(&data).ok()?;
    let age = now_secs().saturating_sub(cached.checked_at);
    (age < CACHE_TTL.as_secs()).then_some(cached.latest)
}

fn write_cache(path: &Path, latest: &str) {
    let cached = CachedRelease {
        checked_at: now_secs(),
        latest: latest.to_string(),
    };
    if let Ok(data) = serde_json::to_vec(&cached) {
        if let Err(e) = crate::util::fs::write(path, data) {
            tracing::debug!("failed to cache latest release: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_returns_fast_result() {
        let outcome = race(Duration::from_secs(5), || {
            Ok(Some((Version::new(0, 1, 0), Version::new(0, 2, 0))))
        });
        assert_eq!(
            outcome,
            UpdateCheck::Available {
                current: Version::new(0, 1, 0),
                latest: Version::new(0, 2, 0)
            }
        );
    }

    #[test]
    fn test_race_abandons_slow_check() {
        let start = std::time::Instant::now();
        let outcome = race(Duration::from_millis(50), || {
            thread::sleep(Duration::from_secs(2));
            Ok(None)
        });

        assert_eq!(outcome, UpdateCheck::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_race_reports_failure() {
        let outcome = race(Duration::from_secs(5), || {
            Err(Error::Precondition("offline".to_string()))
        });
        assert_eq!(outcome, UpdateCheck::Failed("offline".to_string()));
    }

    #[test]
    fn test_newer() {
        assert!(newer(Version::new(1, 0, 0), Version::new(1, 0, 1)).is_some());
        assert!(newer(Version::new(1, 0, 0), Version::new(1, 0, 0)).is_none());
        assert_eq!(parse_version("v2.3.4").unwrap(), Version::new(2, 3, 4));
    }

    #[test]
    fn test_cache_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("latest_release.json");

        write_cache(&path, "v9.9.9");
        assert_eq!(read_cache(&path).as_deref(), Some("v9.9.9"));

        let stale = CachedRelease {
            checked_at: 0,
            latest: "v1.0.0".to_string(),
        };
        std::fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();
        assert!(read_cache(&path).is_none());
    }
}
