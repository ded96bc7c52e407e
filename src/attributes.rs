//! Extracts assertion attributes and maps them to a user identity.
//!
//! The mapping is plain data: configured attribute name -> identity field,
//! nothing more. It only runs once the response is trusted.

use std::collections::{HashMap, HashSet};

use crate::{response::SamlResponseEnvelope, settings::ProviderConfig, Result, SamlError};

/// Attribute name -> ordered values, as found in the assertion.
pub type AttributeBag = HashMap<String, Vec<String>>;

/// The trusted identity handed to the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub provider_login: String,
    pub name: String,
    pub email: Option<String>,
    pub groups: HashSet<String>,
}

pub fn extract_attributes(envelope: &SamlResponseEnvelope) -> Result<AttributeBag> {
    let context = envelope.xpath_context()?;
    let nodes = context
        .evaluate("//saml2p:Response/saml2:Assertion/saml2:AttributeStatement/saml2:Attribute")
        .map(|object| object.get_nodes_as_vec())
        .unwrap_or_default();

    let mut bag = AttributeBag::new();
    for node in nodes {
        let Some(name) = node.get_attribute("Name") else {
            continue;
        };
        let values = node
            .get_child_elements()
            .into_iter()
            .filter(|child| child.get_name() == "AttributeValue")
            .map(|child| child.get_content());
        bag.entry(name).or_default().extend(values);
    }
    Ok(bag)
}

/// Login is checked before name so each missing mandatory field reports its
/// own error. Email and groups are optional; an unset group mapping yields an
/// empty set even when the assertion carries group attributes.
pub fn map_identity(bag: &AttributeBag, config: &ProviderConfig) -> Result<UserIdentity> {
    let provider_login = first_value(bag, &config.user_login_attribute)
        .ok_or(SamlError::MissingAttribute("login"))?;
    let name =
        first_value(bag, &config.user_name_attribute).ok_or(SamlError::MissingAttribute("name"))?;
    let email = config
        .user_email_attribute
        .as_deref()
        .and_then(|attribute| first_value(bag, attribute));
    let groups = config
        .group_attribute
        .as_deref()
        .and_then(|attribute| bag.get(attribute))
        .map(|values| values.iter().cloned().collect::<HashSet<_>>())
        .unwrap_or_default();

    Ok(UserIdentity {
        provider_login,
        name,
        email,
        groups,
    })
}

fn first_value(bag: &AttributeBag, attribute: &str) -> Option<String> {
    bag.get(attribute)
        .and_then(|values| values.first())
        .filter(|value| !value.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{decode_response, DEFAULT_MAX_RESPONSE_BYTES};

    const FULL_RESPONSE: &str = include_str!("../static/response_full.b64");
    const MINIMAL_RESPONSE: &str = include_str!("../static/response_minimal.b64");
    const WITHOUT_LOGIN: &str = include_str!("../static/response_without_login.b64");
    const WITHOUT_NAME: &str = include_str!("../static/response_without_name.b64");

    fn config() -> ProviderConfig {
        ProviderConfig {
            login_url: "https://idp.example.org/saml/sso".into(),
            provider_id: "https://idp.example.org".into(),
            application_id: "my-app".into(),
            certificate: String::new(),
            user_login_attribute: "login".into(),
            user_name_attribute: "name".into(),
            user_email_attribute: Some("email".into()),
            group_attribute: Some("groups".into()),
        }
    }

    fn bag(raw: &str) -> AttributeBag {
        let envelope = decode_response(raw, DEFAULT_MAX_RESPONSE_BYTES).unwrap();
        extract_attributes(&envelope).unwrap()
    }

    #[test]
    fn maps_a_full_assertion() {
        let identity = map_identity(&bag(FULL_RESPONSE), &config()).unwrap();

        assert_eq!(identity.provider_login, "johndoe");
        assert_eq!(identity.name, "John Doe");
        assert_eq!(identity.email.as_deref(), Some("johndoe@email.com"));
        assert_eq!(
            identity.groups,
            HashSet::from(["developer".to_string(), "product-manager".to_string()])
        );
    }

    #[test]
    fn missing_email_is_not_an_error() {
        let identity = map_identity(&bag(MINIMAL_RESPONSE), &config()).unwrap();

        assert_eq!(identity.provider_login, "johndoe");
        assert_eq!(identity.name, "John Doe");
        assert!(identity.email.is_none());
        assert!(identity.groups.is_empty());
    }

    #[test]
    fn missing_login_is_reported_first() {
        let err = map_identity(&bag(WITHOUT_LOGIN), &config()).unwrap_err();
        assert_eq!(err.to_string(), "login is missing");
    }

    #[test]
    fn missing_name_is_reported_when_login_is_present() {
        let err = map_identity(&bag(WITHOUT_NAME), &config()).unwrap_err();
        assert_eq!(err.to_string(), "name is missing");
    }

    #[test]
    fn unset_group_mapping_yields_no_groups() {
        let config = ProviderConfig {
            group_attribute: None,
            ..config()
        };
        let identity = map_identity(&bag(FULL_RESPONSE), &config).unwrap();
        assert!(identity.groups.is_empty());
    }

    #[test]
    fn unset_email_mapping_yields_no_email() {
        let config = ProviderConfig {
            user_email_attribute: None,
            ..config()
        };
        let identity = map_identity(&bag(FULL_RESPONSE), &config).unwrap();
        assert!(identity.email.is_none());
    }

    #[test]
    fn mapping_is_deterministic() {
        let first = map_identity(&bag(FULL_RESPONSE), &config()).unwrap();
        let second = map_identity(&bag(FULL_RESPONSE), &config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn group_values_are_deduplicated() {
        let mut attributes = bag(FULL_RESPONSE);
        attributes
            .get_mut("groups")
            .unwrap()
            .push("developer".to_string());
        let identity = map_identity(&attributes, &config()).unwrap();
        assert_eq!(identity.groups.len(), 2);
    }
}
