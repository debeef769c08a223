pub(crate) const KEYRING_SERVICE: &str = "access-gate";

pub(crate) const SETTINGS_DIR_NAME: &str = "access-gate";
pub(crate) const SETTINGS_FILE_NAME: &str = "settings.json";

pub(crate) const FETCH_TIMEOUT_SECS: u64 = 15;

/// Retry delay after a failed resolution attempt is
/// `min(2^min(attempt, BACKOFF_EXPONENT_CAP), BACKOFF_MAX_SECS)` seconds.
pub(crate) const BACKOFF_EXPONENT_CAP: u32 = 6;
pub(crate) const BACKOFF_MAX_SECS: u64 = 30;
