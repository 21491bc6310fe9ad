//! Sources for the data key that seals local files.
//!
//! The production source keeps a random key in the credential store of the
//! current OS account, so files are only readable by the same user on the
//! same machine. There is no separate key management.

use std::sync::Arc;

use keyring::Entry;
use tracing::{debug, info};

use crate::crypto::DataCipher;
use crate::error::{CompanionError, CompanionResult};

/// Keyring service name used for the data key entry
pub const KEYRING_SERVICE: &str = "EmotionAid";

/// Keyring account name used for the data key entry
pub const KEYRING_ACCOUNT: &str = "local-data-key";

/// Environment variable holding a fixed data key (64 hex characters)
pub const DATA_KEY_ENV: &str = "EMOTIONAID_DATA_KEY";

/// Supplies the 32-byte key used to seal local data.
pub trait KeyProvider: Send + Sync {
    /// Return the data key, creating it on first use if the source supports it.
    fn data_key(&self) -> CompanionResult<[u8; 32]>;
}

/// Data key held in the OS credential store of the current user.
///
/// Windows Credential Manager, macOS Keychain or the Linux kernel keyring,
/// depending on the platform.
#[derive(Debug, Clone)]
pub struct KeyringKeyProvider {
    service: String,
    account: String,
}

impl KeyringKeyProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> CompanionResult<Entry> {
        Entry::new(&self.service, &self.account)
            .map_err(|e| CompanionError::Encryption(format!("credential store unavailable: {}", e)))
    }
}

impl Default for KeyringKeyProvider {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl KeyProvider for KeyringKeyProvider {
    fn data_key(&self) -> CompanionResult<[u8; 32]> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(stored) => {
                debug!(service = %self.service, "Loaded data key from credential store");
                parse_hex_key(&stored)
            }
            Err(keyring::Error::NoEntry) => {
                let key = DataCipher::generate_key();
                entry.set_password(&hex::encode(key)).map_err(|e| {
                    CompanionError::Encryption(format!("failed to store data key: {}", e))
                })?;
                info!(service = %self.service, "Generated new data key in credential store");
                Ok(key)
            }
            Err(e) => Err(CompanionError::Encryption(format!(
                "failed to read data key: {}",
                e
            ))),
        }
    }
}

/// A fixed data key.
///
/// Used by tests and by headless runs that pass the key through the
/// environment.
#[derive(Clone)]
pub struct StaticKeyProvider {
    key: [u8; 32],
}

impl StaticKeyProvider {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parse a key written as 64 hex characters.
    pub fn from_hex(hex_key: &str) -> CompanionResult<Self> {
        parse_hex_key(hex_key).map(Self::new)
    }

    /// A provider with a fresh random key.
    pub fn random() -> Self {
        Self::new(DataCipher::generate_key())
    }
}

impl KeyProvider for StaticKeyProvider {
    fn data_key(&self) -> CompanionResult<[u8; 32]> {
        Ok(self.key)
    }
}

impl std::fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticKeyProvider(..)")
    }
}

/// The provider selected by the environment.
///
/// A fixed key when [`DATA_KEY_ENV`] is set, the OS credential store
/// otherwise.
pub fn provider_from_env() -> CompanionResult<Arc<dyn KeyProvider>> {
    select_provider(std::env::var(DATA_KEY_ENV).ok().as_deref())
}

fn select_provider(hex_key: Option<&str>) -> CompanionResult<Arc<dyn KeyProvider>> {
    match hex_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(hex_key) => {
            debug!("Using data key from {}", DATA_KEY_ENV);
            Ok(Arc::new(StaticKeyProvider::from_hex(hex_key)?))
        }
        None => Ok(Arc::new(KeyringKeyProvider::default())),
    }
}

fn parse_hex_key(hex_key: &str) -> CompanionResult<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| CompanionError::Encryption(format!("data key is not hex: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CompanionError::Encryption(format!("data key must be 32 bytes (got {})", b.len()))
    })
}
