//! Claims decoding for three-segment bearer tokens.
//!
//! Signatures are not verified here: the identity provider issued the token
//! over TLS and resource servers validate it. The client only needs the
//! payload to derive roles, profile data and the expiry used by renewal.

use super::Claims;
use base64ct::{Base64, Base64Url, Encoding};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedTokenError {
    #[error("invalid token format: expected three dot-separated segments")]
    Format,
    #[error("invalid base64 segment length {length}")]
    Padding { length: usize },
    #[error("invalid base64 encoding")]
    Base64,
    #[error("invalid json payload")]
    Json(#[from] serde_json::Error),
    #[error("token payload is not a json object")]
    NotAnObject,
}

/// Appends the `=` padding a base64 segment needs before strict decoding.
///
/// # Errors
///
/// Returns [`MalformedTokenError::Padding`] when `length % 4 == 1`, which no
/// base64 encoder can produce.
pub fn restore_padding(segment: &str) -> Result<String, MalformedTokenError> {
    let segment = segment.trim_end_matches('=');
    match segment.len() % 4 {
        0 => Ok(segment.to_string()),
        2 => Ok(format!("{segment}==")),
        3 => Ok(format!("{segment}=")),
        _ => Err(MalformedTokenError::Padding {
            length: segment.len(),
        }),
    }
}

/// Returns the payload (second) segment of a `header.payload.signature` token.
///
/// # Errors
///
/// Returns [`MalformedTokenError::Format`] unless the token has exactly three segments.
pub fn payload_segment(token: &str) -> Result<&str, MalformedTokenError> {
    let mut parts = token.trim().split('.');
    let _header = parts.next().ok_or(MalformedTokenError::Format)?;
    let payload = parts.next().ok_or(MalformedTokenError::Format)?;
    let _signature = parts.next().ok_or(MalformedTokenError::Format)?;
    if parts.next().is_some() {
        return Err(MalformedTokenError::Format);
    }
    Ok(payload)
}

/// Decodes the claims of a bearer token without verifying its signature.
///
/// Callers treat an error as "no claims available"; it must never abort a login.
///
/// # Errors
///
/// Returns an error if the token is not three segments, the payload is not
/// base64 (url-safe or standard alphabet), or it does not hold a JSON object.
pub fn decode_claims(token: &str) -> Result<Claims, MalformedTokenError> {
    let payload = payload_segment(token)?;
    let padded = restore_padding(payload)?;

    // Tokens are base64url, but some issuers emit the standard alphabet.
    let bytes = Base64Url::decode_vec(&padded)
        .or_else(|_| Base64::decode_vec(&padded))
        .map_err(|_| MalformedTokenError::Base64)?;

    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(Claims::new(map)),
        _ => Err(MalformedTokenError::NotAnObject),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use base64ct::Base64UrlUnpadded;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn mint(payload: &Value) -> (String, String) {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = Base64UrlUnpadded::encode_string(&serde_json::to_vec(payload).unwrap());
        (format!("{header}.{body}.c2lnbmF0dXJl"), body)
    }

    #[test]
    fn restore_padding_by_remainder() {
        assert_eq!(restore_padding("abcd").unwrap(), "abcd");
        assert_eq!(restore_padding("ab").unwrap(), "ab==");
        assert_eq!(restore_padding("abc").unwrap(), "abc=");
        assert!(matches!(
            restore_padding("abcde"),
            Err(MalformedTokenError::Padding { length: 5 })
        ));
    }

    #[test]
    fn restore_padding_accepts_already_padded_segments() {
        assert_eq!(restore_padding("ab==").unwrap(), "ab==");
        assert_eq!(restore_padding("abc=").unwrap(), "abc=");
    }

    #[test]
    fn decode_claims_for_every_padding_remainder() {
        let mut remainders = BTreeSet::new();
        for len in 0..3 {
            let payload = json!({ "sub": "a".repeat(len) });
            let (token, segment) = mint(&payload);
            remainders.insert(segment.len() % 4);

            let claims = decode_claims(&token).unwrap();
            assert_eq!(Value::Object(claims.into_map()), payload);
        }
        assert_eq!(remainders, BTreeSet::from([0, 2, 3]));
    }

    #[test]
    fn decode_claims_accepts_standard_alphabet() {
        let mut exercised = false;
        for shift in 0..3 {
            let sub = format!("{}???", "a".repeat(shift));
            let payload = json!({ "sub": sub });
            let body = Base64::encode_string(&serde_json::to_vec(&payload).unwrap());
            if !body.contains(['+', '/']) {
                continue;
            }
            exercised = true;

            let token = format!("e30.{}.sig", body.trim_end_matches('='));
            let claims = decode_claims(&token).unwrap();
            assert_eq!(claims.subject(), Some(sub.as_str()));
        }
        assert!(exercised);
    }

    #[test]
    fn decode_claims_rejects_wrong_segment_count() {
        assert!(matches!(
            decode_claims("only.two"),
            Err(MalformedTokenError::Format)
        ));
        assert!(matches!(
            decode_claims("a.b.c.d"),
            Err(MalformedTokenError::Format)
        ));
    }

    #[test]
    fn decode_claims_rejects_non_json_and_non_object() {
        let not_json = Base64UrlUnpadded::encode_string(b"not json");
        assert!(matches!(
            decode_claims(&format!("e30.{not_json}.sig")),
            Err(MalformedTokenError::Json(_))
        ));

        let array = Base64UrlUnpadded::encode_string(b"[1,2,3]");
        assert!(matches!(
            decode_claims(&format!("e30.{array}.sig")),
            Err(MalformedTokenError::NotAnObject)
        ));

        assert!(matches!(
            decode_claims("e30.!!!!.sig"),
            Err(MalformedTokenError::Base64)
        ));
    }
}
