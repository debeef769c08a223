use keyring::Entry;

use crate::KEYRING_SERVICE;

/// Durable store for small opaque secrets. `store` upserts; `retrieve`
/// distinguishes a missing record (`Ok(None)`) from a backend failure.
pub(crate) trait SecretStore: Send + Sync {
    fn store(&self, key: &str, value: &str) -> Result<(), String>;
    fn retrieve(&self, key: &str) -> Result<Option<String>, String>;
}

/// OS-keychain secret store. Each key becomes an account under a fixed
/// service name.
pub(crate) struct KeyringSecretStore {
    service: &'static str,
}

impl KeyringSecretStore {
    pub(crate) fn new() -> Self {
        Self {
            service: KEYRING_SERVICE,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(self.service, key)
            .map_err(|error| format!("Failed to open keychain entry {key:?}: {error}"))
    }
}

impl SecretStore for KeyringSecretStore {
    fn store(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| format!("Failed to write keychain entry {key:?}: {error}"))
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(format!("Failed to read keychain entry {key:?}: {error}")),
        }
    }
}
