//! Artifact resolution for completed generations.
//!
//! The service's completion signal does not always name a file the pipeline
//! owns: it may carry a remote location, or nothing beyond a correlation id.
//! In that case an intermediary has deposited the finished image into a flat
//! artifact directory, and the freshest conventionally-named file there is
//! taken to be ours. That heuristic can misattribute files when jobs run
//! concurrently, which is why job finalization tolerates repeats; callers
//! must treat the scan as best-effort.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::generation::RemoteResult;

/// Naming convention for deposited artifacts.
pub const ARTIFACT_PREFIX: &str = "grid_";
pub const ARTIFACT_SUFFIX: &str = ".jpg";

/// How far back the directory scan looks.
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(300);

/// Resolve a remote result to an artifact path.
///
/// A direct (non-URL) artifact reference from the service is ranked above
/// the directory scan and returned as-is. Returns `None` when nothing can
/// be correlated within the window.
pub fn locate_artifact(
    remote: &RemoteResult,
    artifact_dir: &Path,
    window: Duration,
) -> Option<String> {
    if let Some(artifact) = &remote.artifact {
        if !is_remote_url(artifact) {
            return Some(artifact.clone());
        }
        tracing::debug!(
            artifact = %artifact,
            "service reference is remote, falling back to directory scan"
        );
    }

    scan_recent(artifact_dir, window)
}

fn is_remote_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Most recently modified `grid_*.jpg` within the window, by file name.
fn scan_recent(dir: &Path, window: Duration) -> Option<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read artifact directory");
            return None;
        }
    };

    let now = SystemTime::now();
    let mut best: Option<(SystemTime, String)> = None;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(ARTIFACT_PREFIX) || !name.ends_with(ARTIFACT_SUFFIX) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        // A clock-skewed future mtime counts as brand new.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > window {
            continue;
        }
        if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            best = Some((modified, name));
        }
    }

    best.map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn remote(artifact: Option<&str>) -> RemoteResult {
        RemoteResult {
            correlation_id: "corr-1".to_string(),
            artifact: artifact.map(str::to_string),
        }
    }

    fn write_with_age(dir: &Path, name: &str, age: Duration) {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(b"jpeg bytes").unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_direct_reference_wins() {
        let dir = TempDir::new().unwrap();
        write_with_age(dir.path(), "grid_other.jpg", Duration::from_secs(5));

        let result = locate_artifact(
            &remote(Some("grid_direct.jpg")),
            dir.path(),
            DEFAULT_RECENCY_WINDOW,
        );
        assert_eq!(result.as_deref(), Some("grid_direct.jpg"));
    }

    #[test]
    fn test_remote_url_reference_falls_back_to_scan() {
        let dir = TempDir::new().unwrap();
        write_with_age(dir.path(), "grid_local.jpg", Duration::from_secs(5));

        let result = locate_artifact(
            &remote(Some("https://cdn.example/out.png")),
            dir.path(),
            DEFAULT_RECENCY_WINDOW,
        );
        assert_eq!(result.as_deref(), Some("grid_local.jpg"));
    }

    #[test]
    fn test_scan_picks_most_recent_within_window() {
        let dir = TempDir::new().unwrap();
        write_with_age(dir.path(), "grid_fresh.jpg", Duration::from_secs(90));
        write_with_age(dir.path(), "grid_stale.jpg", Duration::from_secs(600));

        let result = locate_artifact(&remote(None), dir.path(), DEFAULT_RECENCY_WINDOW);
        assert_eq!(result.as_deref(), Some("grid_fresh.jpg"));
    }

    #[test]
    fn test_scan_ignores_non_matching_names() {
        let dir = TempDir::new().unwrap();
        write_with_age(dir.path(), "photo.jpg", Duration::from_secs(5));
        write_with_age(dir.path(), "grid_wrong.png", Duration::from_secs(5));

        let result = locate_artifact(&remote(None), dir.path(), DEFAULT_RECENCY_WINDOW);
        assert!(result.is_none());
    }

    #[test]
    fn test_scan_of_empty_directory_finds_nothing() {
        let dir = TempDir::new().unwrap();
        let result = locate_artifact(&remote(None), dir.path(), DEFAULT_RECENCY_WINDOW);
        assert!(result.is_none());
    }

    #[test]
    fn test_everything_outside_window_finds_nothing() {
        let dir = TempDir::new().unwrap();
        write_with_age(dir.path(), "grid_old.jpg", Duration::from_secs(900));

        let result = locate_artifact(&remote(None), dir.path(), DEFAULT_RECENCY_WINDOW);
        assert!(result.is_none());
    }
}
