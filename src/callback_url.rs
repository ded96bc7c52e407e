//! Reconciles the URL a callback was received at with the `Destination` the
//! IdP wrote into the response.
//!
//! Behind a TLS-terminating proxy the origin server sees plain HTTP while the
//! IdP answered the HTTPS edge; the `X-Forwarded-Proto` header carries the
//! externally-visible scheme. Scheme, host and port (default-port aware) and
//! the exact path are significant; query string and fragment are not.

use url::Url;

use crate::{Result, SamlError};

/// The URL the outside world used for this request: the request's own URL,
/// with the scheme replaced by the forwarded protocol when the header is set.
pub fn effective_callback_url(request_url: &str, forwarded_proto: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(request_url).map_err(|e| {
        SamlError::Configuration(format!("request URL {request_url} is not a valid URL: {e}"))
    })?;
    if let Some(proto) = forwarded_proto {
        let proto = proto.trim().to_ascii_lowercase();
        if url.set_scheme(&proto).is_err() {
            return Err(SamlError::Configuration(format!(
                "X-Forwarded-Proto value {proto} is not a usable scheme"
            )));
        }
    }
    Ok(url)
}

pub fn ensure_destination_matches(effective: &Url, destination: &str) -> Result<()> {
    let expected = Url::parse(destination).map_err(|_| {
        SamlError::MalformedResponse(format!("Destination {destination} is not a valid URL"))
    })?;

    let matches = effective.scheme() == expected.scheme()
        && effective.host_str() == expected.host_str()
        && effective.port_or_known_default() == expected.port_or_known_default()
        && effective.path() == expected.path();
    if !matches {
        return Err(SamlError::CallbackMismatch {
            received: effective.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}
