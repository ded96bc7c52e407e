use std::fmt::Display;

use base64::{prelude::BASE64_STANDARD, Engine};
use deflate::deflate_bytes;
use time::OffsetDateTime;
use yaserde::YaSerialize;

use crate::{utils::random_string, DATE_TIME_FORMAT, NAME_ID_FORMAT_UNSPECIFIED};

#[derive(YaSerialize)]
#[yaserde(
  namespaces = {
    "samlp" = "urn:oasis:names:tc:SAML:2.0:protocol",
    "saml" = "urn:oasis:names:tc:SAML:2.0:assertion",
  },
  prefix = "samlp"
)]
struct AuthnRequest {
    #[yaserde(attribute = true, rename = "ID")]
    id: String,
    #[yaserde(attribute = true, rename = "Version")]
    version: String,
    #[yaserde(attribute = true, rename = "IssueInstant")]
    issue_instant: String,
    #[yaserde(attribute = true, rename = "Destination")]
    destination: String,
    #[yaserde(attribute = true, rename = "ProtocolBinding")]
    protocol_binding: String,
    #[yaserde(attribute = true, rename = "AssertionConsumerServiceURL")]
    assertion_consumer_service_url: String,
    #[yaserde(rename = "Issuer", prefix = "saml")]
    issuer: Issuer,
    #[yaserde(rename = "NameIdPolicy", prefix = "samlp")]
    name_id_policy: NameIdPolicy,
}

#[derive(YaSerialize)]
struct Issuer {
    #[yaserde(attribute = true, rename = "Format")]
    format: String,
    #[yaserde(text = true)]
    content: String,
}

#[derive(YaSerialize)]
struct NameIdPolicy {
    #[yaserde(attribute = true, rename = "Format")]
    format: String,
    #[yaserde(attribute = true, rename = "AllowCreate")]
    allow_create: bool,
}

/// Binding the IdP should use when delivering the response to the ACS.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolBinding {
    #[default]
    Post,
    Redirect,
}

impl Display for ProtocolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProtocolBinding::Post => write!(f, "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"),
            ProtocolBinding::Redirect => {
                write!(f, "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect")
            }
        }
    }
}

/// Builds the SP-initiated login request. The issuer, destination and
/// consumer URL come straight from the validated provider configuration, so
/// there are no unset-field states to defend against.
pub struct AuthnRequestBuilder {
    id: String,
    issue_instant: OffsetDateTime,
    issuer: String,
    destination: String,
    consumer_url: String,
    protocol_binding: ProtocolBinding,
    name_format: String,
    allow_create: bool,
}

impl AuthnRequestBuilder {
    pub fn new(issuer: &str, destination: &str, consumer_url: &str) -> Self {
        Self {
            id: format!("_id{}", random_string(32)),
            issue_instant: OffsetDateTime::now_utc(),
            issuer: issuer.into(),
            destination: destination.into(),
            consumer_url: consumer_url.into(),
            protocol_binding: ProtocolBinding::default(),
            name_format: NAME_ID_FORMAT_UNSPECIFIED.into(),
            allow_create: true,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.into();
        self
    }

    pub fn issue_instant(mut self, instant: OffsetDateTime) -> Self {
        self.issue_instant = instant;
        self
    }

    pub fn protocol_binding(mut self, binding: ProtocolBinding) -> Self {
        self.protocol_binding = binding;
        self
    }

    pub fn name_format(mut self, format: &str) -> Self {
        self.name_format = format.into();
        self
    }

    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    pub fn build(self) -> String {
        let request = AuthnRequest {
            id: self.id,
            version: "2.0".to_string(),
            issue_instant: self
                .issue_instant
                .format(&DATE_TIME_FORMAT)
                .expect("Infallible formatting"),
            destination: self.destination,
            protocol_binding: self.protocol_binding.to_string(),
            assertion_consumer_service_url: self.consumer_url,
            issuer: Issuer {
                format: "urn:oasis:names:tc:SAML:2.0:nameid-format:entity".to_string(),
                content: self.issuer,
            },
            name_id_policy: NameIdPolicy {
                format: self.name_format,
                allow_create: self.allow_create,
            },
        };
        yaserde::ser::to_string(&request).expect("Infallible serialization")
    }

    /// Deflate + base64, the form embedded in the redirect query string.
    pub fn build_and_encode(self) -> String {
        let xml = self.build();
        let compressed = deflate_bytes(xml.as_bytes());
        BASE64_STANDARD.encode(compressed)
    }
}
