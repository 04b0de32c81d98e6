//! Response media-type check and body decoding.
//!
//! Only the primary type (the part before `/`) is compared: a caller that
//! accepts `application/json` will take `application/problem+json`, and an
//! `application/xml` answer then fails at the parse step instead.

use axum::body::Bytes;
use serde_json::Value;

use crate::error::GatewayError;

/// Primary type of the first media range, lowercased. `None` for blank input.
pub fn primary_type(media: &str) -> Option<String> {
    let first = media.split(',').next()?.split(';').next()?.trim();
    let primary = first.split('/').next()?.trim();
    if primary.is_empty() {
        None
    } else {
        Some(primary.to_ascii_lowercase())
    }
}

/// Compare the response content type against the request's accept value.
pub fn check_content_type(accept: &str, content_type: Option<&str>) -> Result<(), GatewayError> {
    let mismatch = || GatewayError::ContentTypeMismatch {
        expected: accept.to_string(),
        actual: content_type.unwrap_or("").to_string(),
    };

    let actual = content_type.and_then(primary_type).ok_or_else(mismatch)?;
    match primary_type(accept) {
        None => Ok(()),
        Some(expected) if expected == "*" || expected == actual => Ok(()),
        Some(_) => Err(mismatch()),
    }
}

/// Parse a JSON body; an empty body is `null`.
pub fn parse_body(body: &Bytes) -> Result<Value, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::UpstreamParseFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_type() {
        assert_eq!(primary_type("application/json; charset=utf-8").as_deref(), Some("application"));
        assert_eq!(primary_type("Text/HTML, application/xml").as_deref(), Some("text"));
        assert_eq!(primary_type("*/*").as_deref(), Some("*"));
        assert_eq!(primary_type("  "), None);
    }

    #[test]
    fn test_content_type_check() {
        assert!(check_content_type("application/json", Some("application/json")).is_ok());
        assert!(check_content_type("application/json", Some("application/problem+json")).is_ok());
        assert!(check_content_type("*/*", Some("text/plain")).is_ok());

        let err = check_content_type("application/json", Some("text/html")).unwrap_err();
        assert_eq!(
            err,
            GatewayError::ContentTypeMismatch {
                expected: "application/json".into(),
                actual: "text/html".into()
            }
        );
        assert!(check_content_type("application/json", None).is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(&Bytes::from_static(b"")).unwrap(), Value::Null);
        assert_eq!(parse_body(&Bytes::from_static(br#"{"ok":true}"#)).unwrap(), json!({"ok": true}));
        assert!(matches!(
            parse_body(&Bytes::from_static(b"<html>")),
            Err(GatewayError::UpstreamParseFailure(_))
        ));
    }
}
