//! Typed access to the externally-owned SAML configuration.
//!
//! The embedding application owns the configuration store; this module only
//! reads it, on every call, through the narrow [`Settings`] trait. Validation
//! happens at first use, not at load time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{Result, SamlError};

/// Configuration keys consumed by this crate.
pub mod keys {
    pub const ENABLED: &str = "auth.saml.enabled";
    pub const LOGIN_URL: &str = "auth.saml.loginUrl";
    pub const PROVIDER_ID: &str = "auth.saml.providerId";
    pub const APPLICATION_ID: &str = "auth.saml.applicationId";
    pub const CERTIFICATE: &str = "auth.saml.certificate";
    pub const USER_LOGIN_ATTRIBUTE: &str = "auth.saml.user.login";
    pub const USER_NAME_ATTRIBUTE: &str = "auth.saml.user.name";
    pub const USER_EMAIL_ATTRIBUTE: &str = "auth.saml.user.email";
    pub const GROUP_ATTRIBUTE: &str = "auth.saml.group.name";
    pub const PROVIDER_NAME: &str = "auth.saml.providerName";
}

pub const DEFAULT_PROVIDER_NAME: &str = "SAML";

/// Read-only key-value view of the application's configuration.
pub trait Settings: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory [`Settings`] for tests and embedders without a settings backend.
#[derive(Default)]
pub struct MapSettings {
    values: RwLock<HashMap<String, String>>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn unset(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl Settings for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

/// Immutable snapshot of the provider configuration, rebuilt on every load.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// IdP SSO login URL the browser is redirected to.
    pub login_url: String,
    /// IdP entity id.
    pub provider_id: String,
    /// SP entity id; also the expected assertion audience.
    pub application_id: String,
    /// IdP signing certificate, PEM or bare base64 DER.
    pub certificate: String,
    pub user_login_attribute: String,
    pub user_name_attribute: String,
    pub user_email_attribute: Option<String>,
    pub group_attribute: Option<String>,
}

pub struct SamlSettings {
    source: Arc<dyn Settings>,
}

impl SamlSettings {
    pub fn new(source: Arc<dyn Settings>) -> Self {
        Self { source }
    }

    /// True when the flag is set and every required key is present.
    pub fn is_enabled(&self) -> bool {
        self.flag(keys::ENABLED)
            && [
                keys::LOGIN_URL,
                keys::PROVIDER_ID,
                keys::APPLICATION_ID,
                keys::CERTIFICATE,
            ]
            .iter()
            .all(|key| self.optional(key).is_some())
    }

    /// Human-readable provider display name.
    pub fn provider_name(&self) -> String {
        self.optional(keys::PROVIDER_NAME)
            .unwrap_or_else(|| DEFAULT_PROVIDER_NAME.to_string())
    }

    pub fn load(&self) -> Result<ProviderConfig> {
        Ok(ProviderConfig {
            login_url: self.require(keys::LOGIN_URL)?,
            provider_id: self.require(keys::PROVIDER_ID)?,
            application_id: self.require(keys::APPLICATION_ID)?,
            certificate: self.require(keys::CERTIFICATE)?,
            user_login_attribute: self.require(keys::USER_LOGIN_ATTRIBUTE)?,
            user_name_attribute: self.require(keys::USER_NAME_ATTRIBUTE)?,
            user_email_attribute: self.optional(keys::USER_EMAIL_ATTRIBUTE),
            group_attribute: self.optional(keys::GROUP_ATTRIBUTE),
        })
    }

    fn flag(&self, key: &str) -> bool {
        self.source
            .get(key)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.source.get(key).filter(|value| !value.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| SamlError::Configuration(format!("{key} is not set")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_settings() -> Arc<MapSettings> {
        let map = Arc::new(MapSettings::new());
        map.set(keys::ENABLED, "true");
        map.set(keys::LOGIN_URL, "https://idp.example.org/saml/sso");
        map.set(keys::PROVIDER_ID, "https://idp.example.org");
        map.set(keys::APPLICATION_ID, "my-app");
        map.set(keys::CERTIFICATE, "MIIC...");
        map.set(keys::USER_LOGIN_ATTRIBUTE, "login");
        map.set(keys::USER_NAME_ATTRIBUTE, "name");
        map
    }

    #[test]
    fn enabled_requires_flag_and_required_keys() {
        let map = full_settings();
        let settings = SamlSettings::new(map.clone());
        assert!(settings.is_enabled());

        map.set(keys::ENABLED, "false");
        assert!(!settings.is_enabled());

        map.set(keys::ENABLED, "true");
        map.unset(keys::CERTIFICATE);
        assert!(!settings.is_enabled());
    }

    #[test]
    fn load_names_the_missing_key() {
        let map = full_settings();
        map.unset(keys::PROVIDER_ID);
        let settings = SamlSettings::new(map);

        let err = settings.load().unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
        assert!(err.to_string().contains("auth.saml.providerId"));
    }

    #[test]
    fn load_builds_a_full_config() {
        let map = full_settings();
        map.set(keys::USER_EMAIL_ATTRIBUTE, "email");
        map.set(keys::GROUP_ATTRIBUTE, "groups");
        let settings = SamlSettings::new(map);

        let config = settings.load().unwrap();
        assert_eq!(config.application_id, "my-app");
        assert_eq!(config.user_email_attribute.as_deref(), Some("email"));
        assert_eq!(config.group_attribute.as_deref(), Some("groups"));
    }

    #[test]
    fn optional_attributes_ignore_blank_values() {
        let map = full_settings();
        map.set(keys::GROUP_ATTRIBUTE, "  ");
        let settings = SamlSettings::new(map);

        let config = settings.load().unwrap();
        assert!(config.group_attribute.is_none());
    }

    #[test]
    fn provider_name_defaults_and_rereads() {
        let map = full_settings();
        let settings = SamlSettings::new(map.clone());
        assert_eq!(settings.provider_name(), "SAML");

        map.set(keys::PROVIDER_NAME, "My Provider");
        assert_eq!(settings.provider_name(), "My Provider");
    }
}
