mod attributes;
mod authn_request;
mod callback_url;
mod error;
mod provider;
mod replay;
mod response;
mod settings;
mod signature;
mod utils;

pub use attributes::{extract_attributes, map_identity, AttributeBag, UserIdentity};
pub use authn_request::{AuthnRequestBuilder, ProtocolBinding};
pub use callback_url::{effective_callback_url, ensure_destination_matches};
pub use error::{Result, SamlError};
pub use provider::{
    CallbackContext, InitContext, SamlProvider, FORWARDED_PROTO_HEADER, RELAY_STATE_PARAMETER,
    SAML_RESPONSE_PARAMETER,
};
pub use replay::MessageIdStore;
pub use response::{
    check_conditions, decode_response, SamlResponseEnvelope, DEFAULT_MAX_RESPONSE_BYTES,
};
pub use settings::{keys, MapSettings, ProviderConfig, SamlSettings, Settings};
pub use signature::verify_signature;
use time::format_description::well_known::iso8601::{self, TimePrecision};

pub const SAML_PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const XML_DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

pub const NAME_ID_FORMAT_UNSPECIFIED: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

// xs:dateTime isn't actually ISO8601, because implementors often don't support higher precisions.
pub const DATE_TIME_FORMAT: iso8601::Iso8601<
    {
        iso8601::Config::DEFAULT
            .set_time_precision(TimePrecision::Second {
                decimal_digits: None,
            })
            .encode()
    },
> = iso8601::Iso8601;
