use libxml::{parser::Parser as XmlParser, tree::Document, xpath::Context};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

use crate::{
    utils::decode_xml_base64, Result, SamlError, SAML_ASSERTION_NS, SAML_PROTOCOL_NS, XML_DSIG_NS,
};

/// Ceiling on the decoded response size, a guard against parsing
/// amplification. Real-world responses are a few kilobytes.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// One decoded SAML response. Created per callback, never persisted.
pub struct SamlResponseEnvelope {
    raw: Vec<u8>,
    document: Document,
    message_id: String,
    destination: String,
    issue_instant: OffsetDateTime,
}

impl std::fmt::Debug for SamlResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlResponseEnvelope")
            .field("message_id", &self.message_id)
            .field("destination", &self.destination)
            .field("issue_instant", &self.issue_instant)
            .finish_non_exhaustive()
    }
}

impl SamlResponseEnvelope {
    /// Unique id the IdP assigned to this response; replay checks key on it.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The SP URL the IdP believes it is answering.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn issue_instant(&self) -> OffsetDateTime {
        self.issue_instant
    }

    pub fn raw_xml(&self) -> &[u8] {
        &self.raw
    }

    pub(crate) fn document(&self) -> &Document {
        &self.document
    }

    pub(crate) fn xpath_context(&self) -> Result<Context> {
        xpath_context(&self.document)
    }
}

fn xpath_context(document: &Document) -> Result<Context> {
    let mut context = Context::new(document)
        .map_err(|_| SamlError::MalformedResponse("failed to create XPath context".into()))?;
    for (prefix, href) in [
        ("saml2p", SAML_PROTOCOL_NS),
        ("saml2", SAML_ASSERTION_NS),
        ("ds", XML_DSIG_NS),
    ] {
        context
            .register_namespace(prefix, href)
            .map_err(|_| SamlError::MalformedResponse("failed to register namespace".into()))?;
    }
    Ok(context)
}

fn required_value(context: &mut Context, xpath: &str, field: &str) -> Result<String> {
    context
        .findvalue(xpath, None)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SamlError::MalformedResponse(format!("{field} is absent")))
}

/// Decodes the `SAMLResponse` form parameter into an envelope.
///
/// Rejects input that is not base64, larger than `limit` once decoded, not
/// well-formed XML, or missing the response id, destination or issue instant.
pub fn decode_response(input: &str, limit: usize) -> Result<SamlResponseEnvelope> {
    let raw = decode_xml_base64(input)
        .map_err(|e| SamlError::MalformedResponse(format!("invalid base64: {e}")))?;
    if raw.len() > limit {
        return Err(SamlError::OversizedResponse {
            size: raw.len(),
            limit,
        });
    }

    let parser = XmlParser::default();
    let document = parser
        .parse_string(&raw)
        .map_err(|e| SamlError::MalformedResponse(format!("invalid XML: {e}")))?;

    let mut context = xpath_context(&document)?;
    let message_id = required_value(&mut context, "//saml2p:Response/@ID", "message ID")?;
    let destination = required_value(&mut context, "//saml2p:Response/@Destination", "Destination")?;
    let issue_instant =
        required_value(&mut context, "//saml2p:Response/@IssueInstant", "IssueInstant")?;
    let issue_instant = OffsetDateTime::parse(&issue_instant, &Iso8601::DEFAULT)
        .map_err(|_| SamlError::MalformedResponse("IssueInstant is not a valid instant".into()))?;
    drop(context);

    Ok(SamlResponseEnvelope {
        raw,
        document,
        message_id,
        destination,
        issue_instant,
    })
}

/// Enforces the assertion's `Conditions` when present: validity window and,
/// if an `AudienceRestriction` is given, that it names this SP.
///
/// Runs after signature verification and before replay recording, so an
/// expired or misdirected assertion never consumes a message id.
pub fn check_conditions(
    envelope: &SamlResponseEnvelope,
    audience: &str,
    now: OffsetDateTime,
) -> Result<()> {
    let mut context = envelope.xpath_context()?;
    let nodes = context
        .evaluate("//saml2p:Response/saml2:Assertion/saml2:Conditions")
        .map(|object| object.get_nodes_as_vec())
        .unwrap_or_default();
    let Some(condition_node) = nodes.into_iter().next() else {
        return Ok(());
    };

    if let Ok(not_before) = context.findvalue("./@NotBefore", Some(&condition_node)) {
        if !not_before.is_empty() {
            let not_before = OffsetDateTime::parse(&not_before, &Iso8601::DEFAULT)
                .map_err(|_| SamlError::MalformedResponse("invalid NotBefore".into()))?;
            if now < not_before {
                return Err(SamlError::ConditionNotMet(
                    "the assertion is not yet valid".into(),
                ));
            }
        }
    }

    if let Ok(not_on_or_after) = context.findvalue("./@NotOnOrAfter", Some(&condition_node)) {
        if !not_on_or_after.is_empty() {
            let not_on_or_after = OffsetDateTime::parse(&not_on_or_after, &Iso8601::DEFAULT)
                .map_err(|_| SamlError::MalformedResponse("invalid NotOnOrAfter".into()))?;
            if now >= not_on_or_after {
                return Err(SamlError::ConditionNotMet(
                    "the assertion has expired".into(),
                ));
            }
        }
    }

    if let Ok(restriction) = context.findvalue(
        "./saml2:AudienceRestriction/saml2:Audience/text()",
        Some(&condition_node),
    ) {
        if !restriction.is_empty() && restriction != audience {
            return Err(SamlError::ConditionNotMet(
                "the assertion was issued for another audience".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{prelude::BASE64_STANDARD, Engine};

    const FULL_RESPONSE: &str = include_str!("../static/response_full.b64");

    fn parse_instant(value: &str) -> OffsetDateTime {
        OffsetDateTime::parse(value, &Iso8601::DEFAULT).unwrap()
    }

    #[test]
    fn decodes_envelope_fields() {
        let envelope = decode_response(FULL_RESPONSE, DEFAULT_MAX_RESPONSE_BYTES).unwrap();

        assert!(envelope.message_id().starts_with('_'));
        assert_eq!(
            envelope.destination(),
            "http://localhost:9000/oauth2/callback/saml"
        );
        assert_eq!(
            envelope.issue_instant(),
            parse_instant("2025-08-29T10:00:00Z")
        );
        assert!(String::from_utf8_lossy(envelope.raw_xml()).contains("saml2p:Response"));
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_response("not*base64", DEFAULT_MAX_RESPONSE_BYTES).unwrap_err();
        assert!(matches!(err, SamlError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_non_xml_payload() {
        let encoded = BASE64_STANDARD.encode("this is not xml");
        let err = decode_response(&encoded, DEFAULT_MAX_RESPONSE_BYTES).unwrap_err();
        assert!(matches!(err, SamlError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_response_without_destination() {
        let xml = r#"<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_x" IssueInstant="2025-08-29T10:00:00Z" Version="2.0"></saml2p:Response>"#;
        let err =
            decode_response(&BASE64_STANDARD.encode(xml), DEFAULT_MAX_RESPONSE_BYTES).unwrap_err();
        assert!(err.to_string().contains("Destination"));
    }

    #[test]
    fn rejects_oversized_response() {
        let err = decode_response(FULL_RESPONSE, 64).unwrap_err();
        assert!(matches!(err, SamlError::OversizedResponse { limit: 64, .. }));
    }

    #[test]
    fn conditions_hold_inside_the_window() {
        let envelope = decode_response(FULL_RESPONSE, DEFAULT_MAX_RESPONSE_BYTES).unwrap();
        check_conditions(&envelope, "my-app", parse_instant("2025-08-29T10:00:05Z")).unwrap();
    }

    #[test]
    fn conditions_reject_expired_assertion() {
        let envelope = decode_response(FULL_RESPONSE, DEFAULT_MAX_RESPONSE_BYTES).unwrap();
        let err = check_conditions(&envelope, "my-app", parse_instant("2099-06-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, SamlError::ConditionNotMet(_)));
    }

    #[test]
    fn conditions_reject_not_yet_valid_assertion() {
        let envelope = decode_response(FULL_RESPONSE, DEFAULT_MAX_RESPONSE_BYTES).unwrap();
        let err = check_conditions(&envelope, "my-app", parse_instant("2019-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, SamlError::ConditionNotMet(_)));
    }

    #[test]
    fn conditions_reject_foreign_audience() {
        let envelope = decode_response(FULL_RESPONSE, DEFAULT_MAX_RESPONSE_BYTES).unwrap();
        let err = check_conditions(&envelope, "other-app", parse_instant("2025-08-29T10:00:05Z"))
            .unwrap_err();
        assert!(matches!(err, SamlError::ConditionNotMet(_)));
    }
}
