//! XML-DSig verification of the SAML response.
//!
//! The single configured IdP certificate is the sole trust anchor: the key is
//! loaded from configuration and handed to xmlsec directly, so a signature
//! from any other certificate fails regardless of what the response's own
//! `KeyInfo` claims. No chain validation.

use tracing::warn;
use xmlsec::{XmlSecDocumentExt as _, XmlSecKey, XmlSecKeyFormat, XmlSecSignatureContext};

use crate::{
    response::SamlResponseEnvelope, utils::decode_xml_base64, Result, SamlError, SAML_PROTOCOL_NS,
};

/// Verifies the response's enveloped signature against the configured
/// certificate (PEM or bare base64 DER).
pub fn verify_signature(envelope: &SamlResponseEnvelope, certificate: &str) -> Result<()> {
    let der = certificate_der(certificate)?;
    let key = XmlSecKey::from_memory(&der, XmlSecKeyFormat::CertDer, None)
        .map_err(|_| SamlError::InvalidCertificate)?;

    let context = envelope.xpath_context()?;
    let signature_present = context
        .evaluate("//saml2p:Response/ds:Signature")
        .map(|object| !object.get_nodes_as_vec().is_empty())
        .unwrap_or(false);
    if !signature_present {
        warn!(
            message_id = %envelope.message_id(),
            "SAML response carries no signature"
        );
        return Err(SamlError::InvalidSignature);
    }

    let mut sigctx = XmlSecSignatureContext::new();
    sigctx.insert_key(key);

    envelope
        .document()
        .specify_idattr(
            "//saml2p:Response",
            "ID",
            Some(&[("saml2p", SAML_PROTOCOL_NS)]),
        )
        .map_err(|_| {
            SamlError::MalformedResponse("could not register the response ID attribute".into())
        })?;

    let valid = sigctx
        .verify_document(envelope.document())
        .map_err(|_| SamlError::InvalidSignature)?;
    if !valid {
        warn!(
            message_id = %envelope.message_id(),
            "SAML response signature did not verify against the configured certificate"
        );
        return Err(SamlError::InvalidSignature);
    }
    Ok(())
}

fn certificate_der(certificate: &str) -> Result<Vec<u8>> {
    let body = certificate
        .replace("-----BEGIN CERTIFICATE-----", "")
        .replace("-----END CERTIFICATE-----", "");
    let der = decode_xml_base64(&body).map_err(|_| SamlError::InvalidCertificate)?;
    if der.is_empty() {
        return Err(SamlError::InvalidCertificate);
    }
    Ok(der)
}
