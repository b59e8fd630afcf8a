//! Generation-service credential resolution.
//!
//! The service needs a channel identifier and an account token per request.
//! Callers can supply them on the request itself, store them in the settings
//! table, or export them in the environment; the first source with a
//! complete pair wins. Resolution happens once, at the pipeline entry point,
//! and the resolved value is threaded through explicitly.

use std::env;

use thiserror::Error;

/// Settings keys checked by the resolver.
pub const SETTING_CHANNEL_ID: &str = "gen.channel_id";
pub const SETTING_AUTH_TOKEN: &str = "gen.auth_token";

/// Environment variables checked by the resolver.
pub const ENV_CHANNEL_ID: &str = "PLATESHOT_GEN_CHANNEL_ID";
pub const ENV_AUTH_TOKEN: &str = "PLATESHOT_GEN_AUTH_TOKEN";

/// Channel + account token pair for the generation service.
#[derive(Debug, Clone)]
pub struct GenCredentials {
    pub channel_id: String,
    pub auth_token: String,
}

impl GenCredentials {
    pub fn new(channel_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            auth_token: auth_token.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.channel_id.trim().is_empty() && !self.auth_token.trim().is_empty()
    }
}

/// Which source satisfied the lookup, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Request,
    Settings,
    Environment,
}

#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: GenCredentials,
    pub source: CredentialSource,
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "Generation credentials are not configured. To fix this, either:\n\
         \x20 1. pass a channel id and account token on the request, or\n\
         \x20 2. store `{SETTING_CHANNEL_ID}` and `{SETTING_AUTH_TOKEN}` in settings, or\n\
         \x20 3. set {ENV_CHANNEL_ID} and {ENV_AUTH_TOKEN} in the environment"
    )]
    NotConfigured,
}

/// Read access to the persisted key-value settings store. Implementations
/// should treat lookup failures as "absent" (log and return `None`); the
/// resolver falls through to the next source.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory settings store for tests.
#[derive(Default)]
pub struct MemorySettings {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

/// Resolve credentials through the ordered fallback chain: request override,
/// settings store, environment. A source must yield *both* values; partial
/// pairs are treated as absent. Fails fast so the pipeline never attempts a
/// submission without credentials.
pub fn resolve(
    request_override: Option<&GenCredentials>,
    settings: Option<&dyn SettingsStore>,
) -> Result<ResolvedCredentials, CredentialsError> {
    if let Some(creds) = request_override {
        if creds.is_complete() {
            return Ok(ResolvedCredentials {
                credentials: creds.clone(),
                source: CredentialSource::Request,
            });
        }
        tracing::debug!("request-scoped credentials incomplete, falling through");
    }

    if let Some(store) = settings {
        let pair = GenCredentials {
            channel_id: store.get(SETTING_CHANNEL_ID).unwrap_or_default(),
            auth_token: store.get(SETTING_AUTH_TOKEN).unwrap_or_default(),
        };
        if pair.is_complete() {
            return Ok(ResolvedCredentials {
                credentials: pair,
                source: CredentialSource::Settings,
            });
        }
    }

    let pair = GenCredentials {
        channel_id: env::var(ENV_CHANNEL_ID).unwrap_or_default(),
        auth_token: env::var(ENV_AUTH_TOKEN).unwrap_or_default(),
    };
    if pair.is_complete() {
        return Ok(ResolvedCredentials {
            credentials: pair,
            source: CredentialSource::Environment,
        });
    }

    Err(CredentialsError::NotConfigured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_override_wins() {
        let settings = MemorySettings::new();
        settings.set(SETTING_CHANNEL_ID, "settings-channel");
        settings.set(SETTING_AUTH_TOKEN, "settings-token");

        let override_creds = GenCredentials::new("req-channel", "req-token");
        let resolved = resolve(Some(&override_creds), Some(&settings)).unwrap();
        assert_eq!(resolved.source, CredentialSource::Request);
        assert_eq!(resolved.credentials.channel_id, "req-channel");
    }

    #[test]
    fn test_partial_override_falls_through_to_settings() {
        let settings = MemorySettings::new();
        settings.set(SETTING_CHANNEL_ID, "settings-channel");
        settings.set(SETTING_AUTH_TOKEN, "settings-token");

        let partial = GenCredentials::new("req-channel", "");
        let resolved = resolve(Some(&partial), Some(&settings)).unwrap();
        assert_eq!(resolved.source, CredentialSource::Settings);
    }

    #[test]
    fn test_partial_settings_are_treated_as_absent() {
        let settings = MemorySettings::new();
        settings.set(SETTING_CHANNEL_ID, "settings-channel");
        // No token stored; environment is also unset in tests.
        let result = resolve(None, Some(&settings));
        assert!(matches!(result, Err(CredentialsError::NotConfigured)));
    }

    #[test]
    fn test_not_configured_error_carries_remediation() {
        let err = resolve(None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(ENV_CHANNEL_ID));
        assert!(message.contains(SETTING_AUTH_TOKEN));
    }
}
