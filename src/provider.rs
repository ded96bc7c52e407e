//! The SAML identity provider: ties settings, request building and response
//! validation into the two entry points the embedding application calls.
//!
//! The application supplies the HTTP surface through the [`InitContext`] and
//! [`CallbackContext`] traits; this module owns the protocol decisions and the
//! validation order.

use time::OffsetDateTime;
use tracing::{info, warn};
use url::Url;

use crate::{
    attributes::{extract_attributes, map_identity, UserIdentity},
    authn_request::AuthnRequestBuilder,
    callback_url::{effective_callback_url, ensure_destination_matches},
    replay::MessageIdStore,
    response::{check_conditions, decode_response, DEFAULT_MAX_RESPONSE_BYTES},
    settings::SamlSettings,
    signature::verify_signature,
    Result, SamlError,
};

/// POST-binding form parameter carrying the base64 response.
pub const SAML_RESPONSE_PARAMETER: &str = "SAMLResponse";
/// Form and query parameter carrying the CSRF relay state.
pub const RELAY_STATE_PARAMETER: &str = "RelayState";
/// Header set by a TLS-terminating proxy with the externally-visible scheme.
pub const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";

/// What the provider needs from the HTTP layer to start a login.
pub trait InitContext {
    /// Creates, stores and returns a fresh CSRF state token.
    fn generate_csrf_state(&mut self) -> String;

    /// Absolute URL of this SP's assertion consumer endpoint.
    fn callback_url(&self) -> &str;

    fn redirect_to(&mut self, url: &str);
}

/// What the provider needs from the HTTP layer to finish a login.
pub trait CallbackContext {
    fn callback_url(&self) -> &str;

    /// Absolute URL this request was received at, as seen by the server.
    fn request_url(&self) -> &str;

    fn form_parameter(&self, name: &str) -> Option<String>;

    fn header(&self, name: &str) -> Option<String>;

    /// Checks the named parameter against the state stored at init time.
    fn verify_csrf_state(&mut self, parameter_name: &str) -> Result<()>;

    /// Establishes the session for the validated identity.
    fn authenticate(&mut self, identity: UserIdentity);

    fn redirect_to_requested_page(&mut self);
}

pub struct SamlProvider {
    settings: SamlSettings,
    message_ids: MessageIdStore,
}

impl SamlProvider {
    pub fn new(settings: SamlSettings, message_ids: MessageIdStore) -> Self {
        Self {
            settings,
            message_ids,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.is_enabled()
    }

    pub fn name(&self) -> String {
        self.settings.provider_name()
    }

    /// Starts a login: builds a redirect-binding AuthnRequest and sends the
    /// browser to the IdP with the request and a fresh relay state attached.
    pub fn init(&self, context: &mut dyn InitContext) -> Result<()> {
        let config = self.settings.load()?;
        let login_url = Url::parse(&config.login_url).map_err(|e| {
            SamlError::Configuration(format!(
                "{} {} is not a valid URL: {e}",
                crate::settings::keys::LOGIN_URL,
                config.login_url
            ))
        })?;

        let request = AuthnRequestBuilder::new(
            &config.application_id,
            &config.login_url,
            context.callback_url(),
        )
        .build_and_encode();
        let relay_state = context.generate_csrf_state();

        let separator = if login_url.query().is_some() { '&' } else { '?' };
        let redirect = format!(
            "{}{separator}SAMLRequest={}&{RELAY_STATE_PARAMETER}={}",
            config.login_url,
            urlencoding::encode(&request),
            urlencoding::encode(&relay_state),
        );
        context.redirect_to(&redirect);
        Ok(())
    }

    /// Finishes a login from the IdP's POST callback.
    ///
    /// Validation order is fixed: decode, reconcile the callback URL against
    /// the response's Destination, verify the signature, check the assertion
    /// conditions, record the message id, map attributes, verify the relay
    /// state. Only then is the session established.
    pub fn callback(&self, context: &mut dyn CallbackContext) -> Result<()> {
        let config = self.settings.load()?;

        let encoded = context
            .form_parameter(SAML_RESPONSE_PARAMETER)
            .ok_or_else(|| {
                SamlError::MalformedResponse(format!("{SAML_RESPONSE_PARAMETER} parameter is absent"))
            })?;
        let envelope = decode_response(&encoded, DEFAULT_MAX_RESPONSE_BYTES)?;

        let forwarded_proto = context.header(FORWARDED_PROTO_HEADER);
        let effective = effective_callback_url(context.request_url(), forwarded_proto.as_deref())?;
        if let Err(e) = ensure_destination_matches(&effective, envelope.destination()) {
            warn!(
                message_id = %envelope.message_id(),
                destination = %envelope.destination(),
                "SAML response destination does not match the callback URL"
            );
            return Err(e);
        }

        verify_signature(&envelope, &config.certificate)?;
        check_conditions(&envelope, &config.application_id, OffsetDateTime::now_utc())?;

        if let Err(e) = self.message_ids.check_and_record(envelope.message_id()) {
            if matches!(e, SamlError::Replay) {
                warn!(
                    message_id = %envelope.message_id(),
                    "replayed SAML response rejected"
                );
            }
            return Err(e);
        }

        let attributes = extract_attributes(&envelope)?;
        let identity = map_identity(&attributes, &config)?;

        context.verify_csrf_state(RELAY_STATE_PARAMETER)?;

        info!(
            login = %identity.provider_login,
            message_id = %envelope.message_id(),
            "SAML user authenticated"
        );
        context.authenticate(identity);
        context.redirect_to_requested_page();
        Ok(())
    }
}
