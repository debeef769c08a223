#[cfg(debug_assertions)]
use std::io::Write as _;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt as _;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::Ordering,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{FILE_SUFFIX_COUNTER, SETTINGS_DIR_NAME, SETTINGS_FILE_NAME};

pub(crate) fn settings_file() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to resolve user config dir".to_string())?
        .join(SETTINGS_DIR_NAME);

    fs::create_dir_all(&config_dir)
        .map_err(|error| format!("Failed to create config directory: {error}"))?;

    Ok(config_dir.join(SETTINGS_FILE_NAME))
}

pub(crate) fn restrict_file_permissions(path: &Path) {
    #[cfg(not(unix))]
    let _ = path;
    #[cfg(unix)]
    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            debug_log(&format!(
                "restrict_file_permissions: failed for {path:?}: {error}"
            ));
        }
    }
}

/// Formats a control URL for logging with the query string blanked out, so
/// the shared secret never lands in a log line.
pub(crate) fn redact_control_url(url: &reqwest::Url) -> String {
    let mut parsed = url.clone();
    if parsed.query().is_some() {
        parsed.set_query(Some("p=***"));
    }
    parsed.to_string()
}

pub(crate) fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn unique_time_suffix() -> u64 {
    FILE_SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn debug_log(message: &str) {
    #[cfg(not(debug_assertions))]
    let _ = message;
    #[cfg(debug_assertions)]
    {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[access-gate][{ts}] {message}\n");
        eprint!("{line}");
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/access-gate.log")
        {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_input_alone() {
        assert_eq!(truncate_message("hello", 10), "hello");
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate_message("hello world", 5), "hello...");
    }

    #[test]
    fn redacted_url_hides_query() {
        let url =
            reqwest::Url::parse("https://resolver.test/gate?p=secret&os=linux&lng=en").unwrap();
        let redacted = redact_control_url(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.ends_with("?p=***"));
    }

    #[test]
    fn redacted_url_without_query_is_unchanged() {
        let url = reqwest::Url::parse("https://resolver.test/gate").unwrap();
        assert_eq!(redact_control_url(&url), "https://resolver.test/gate");
    }
}
