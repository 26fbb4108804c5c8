//! JSON request decoding and response encoding
//!
//! Request bodies are capped at [`MAX_BODY_BYTES`], must hold exactly one
//! JSON object and may not carry keys the target type does not declare
//! (targets opt in with `#[serde(deny_unknown_fields)]`). Every failure is
//! mapped onto a [`JsonError`] whose message is safe to show to clients.

use axum::{
    async_trait,
    body::{Body, Bytes, to_bytes},
    extract::{FromRequest, Request},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, error::Category};
use thiserror::Error;
use tracing::error;

use crate::error::ApiError;

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Reasons a request body could not be decoded.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JsonError {
    #[error("body must not be larger than 1MB")]
    TooLarge,

    #[error("body must not be empty")]
    Empty,

    #[error("body contains badly-formed JSON (at character {0})")]
    Syntax(usize),

    #[error("body contains badly-formed JSON")]
    UnexpectedEof,

    #[error("body contains incorrect JSON type for field \"{0}\"")]
    IncorrectFieldType(String),

    /// Type mismatch at the top level, i.e. the body has the wrong shape.
    #[error("body contains incorrect JSON type (at character {0})")]
    IncorrectType(usize),

    #[error("body contains unknown key \"{0}\"")]
    UnknownKey(String),

    #[error("body must only contain a single JSON value")]
    TrailingData,

    /// A field's own deserializer rejected its value, e.g. a malformed price.
    #[error("{0}")]
    InvalidValue(String),

    #[error("unable to read request body")]
    Read,
}

/// Decode exactly one JSON object from `body` into `T`.
///
/// The body is parsed into a [`Value`] first so that arrays and scalars are
/// rejected as the wrong shape instead of filling struct fields by position.
pub fn read_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, JsonError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(JsonError::TooLarge);
    }
    let Some(start) = body.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Err(JsonError::Empty);
    };

    let mut de = serde_json::Deserializer::from_slice(body);
    let document = Value::deserialize(&mut de).map_err(|err| classify(body, None, err))?;
    de.end().map_err(|_| JsonError::TrailingData)?;

    if !document.is_object() {
        return Err(JsonError::IncorrectType(start + 1));
    }

    serde_path_to_error::deserialize(document).map_err(|err| {
        let field = (err.path().iter().next().is_some()).then(|| err.path().to_string());
        classify(body, field, err.into_inner())
    })
}

fn classify(body: &[u8], field: Option<String>, err: serde_json::Error) -> JsonError {
    let offset = byte_offset(body, err.line(), err.column());

    match err.classify() {
        Category::Eof => JsonError::UnexpectedEof,
        Category::Syntax => JsonError::Syntax(offset),
        Category::Io => JsonError::Read,
        Category::Data => {
            let message = strip_position(&err.to_string());

            if let Some(key) = unknown_field(&message) {
                return JsonError::UnknownKey(key);
            }

            if message.starts_with("invalid type") {
                return match field {
                    Some(field) => JsonError::IncorrectFieldType(field),
                    None => JsonError::IncorrectType(offset),
                };
            }

            JsonError::InvalidValue(message)
        }
    }
}

/// serde_json reports 1-based lines and columns; clients get a byte offset.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    line_start + column
}

fn strip_position(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

fn unknown_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Serialize `envelope`, append a newline and attach `headers`.
///
/// Serialization failures degrade to a bare 500; the envelope never reaches
/// the client half-written.
pub fn write_json<T: Serialize + ?Sized>(
    status: StatusCode,
    envelope: &T,
    headers: HeaderMap,
) -> Response {
    let mut body = match serde_json::to_vec_pretty(envelope) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to encode response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    body.push(b'\n');

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Body extractor running [`read_json`] over the request body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req.into_body()).await?;
        Ok(JsonBody(read_json(&bytes)?))
    }
}

async fn read_body(body: Body) -> Result<Bytes, JsonError> {
    to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        let inner = err.into_inner();
        if inner.is::<LengthLimitError>() {
            JsonError::TooLarge
        } else {
            JsonError::Read
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Input {
        name: String,
        #[serde(default)]
        supplier: i64,
    }

    #[test]
    fn decodes_a_single_value() {
        let input: Input = read_json(br#"{"name":"Bolt","supplier":3}"#).unwrap();
        assert_eq!(
            input,
            Input {
                name: "Bolt".into(),
                supplier: 3
            }
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = read_json::<Input>(br#"{"name":"x","bogus":1}"#).unwrap_err();
        assert_eq!(err, JsonError::UnknownKey("bogus".into()));
        assert_eq!(err.to_string(), "body contains unknown key \"bogus\"");
    }

    #[test]
    fn rejects_trailing_values() {
        let err = read_json::<Input>(br#"{"name":"x"} {"name":"y"}"#).unwrap_err();
        assert_eq!(err, JsonError::TrailingData);
    }

    #[test]
    fn rejects_empty_bodies() {
        assert_eq!(read_json::<Input>(b"").unwrap_err(), JsonError::Empty);
        assert_eq!(read_json::<Input>(b"  \n").unwrap_err(), JsonError::Empty);
    }

    #[test]
    fn rejects_oversized_bodies() {
        let body = vec![b' '; MAX_BODY_BYTES + 1];
        assert_eq!(read_json::<Input>(&body).unwrap_err(), JsonError::TooLarge);
    }

    #[test]
    fn reports_syntax_offsets() {
        let err = read_json::<Input>(br#"{"name": "x",}"#).unwrap_err();
        assert!(matches!(err, JsonError::Syntax(_)), "{err:?}");
    }

    #[test]
    fn reports_truncated_bodies() {
        let err = read_json::<Input>(br#"{"name": "x""#).unwrap_err();
        assert_eq!(err, JsonError::UnexpectedEof);
    }

    #[test]
    fn names_the_mistyped_field() {
        let err = read_json::<Input>(br#"{"name":"x","supplier":"three"}"#).unwrap_err();
        assert_eq!(err, JsonError::IncorrectFieldType("supplier".into()));
    }

    #[test]
    fn reports_wrong_shape_at_top_level() {
        let err = read_json::<Input>(br#""Bolt""#).unwrap_err();
        assert!(matches!(err, JsonError::IncorrectType(_)), "{err:?}");
    }

    #[test]
    fn rejects_arrays_instead_of_objects() {
        assert_eq!(
            read_json::<Input>(b"[]").unwrap_err(),
            JsonError::IncorrectType(1)
        );
        assert_eq!(
            read_json::<Input>(br#"  ["Bolt", 3]"#).unwrap_err(),
            JsonError::IncorrectType(3)
        );
        assert_eq!(
            read_json::<Input>(b"[1,").unwrap_err(),
            JsonError::UnexpectedEof
        );
    }

    #[test]
    fn byte_offset_spans_lines() {
        let body = b"{\n  \"a\": 1,\n}";
        assert_eq!(byte_offset(body, 1, 3), 3);
        assert_eq!(byte_offset(body, 2, 2), 4);
    }

    #[test]
    fn write_json_appends_newline_and_merges_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static("/v1/items/1"));
        let response = write_json(
            StatusCode::CREATED,
            &serde_json::json!({"status": "ok"}),
            headers,
        );

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::LOCATION], "/v1/items/1");
    }

    #[tokio::test]
    async fn written_envelopes_read_back() {
        let response = write_json(
            StatusCode::OK,
            &serde_json::json!({"name": "Bolt", "supplier": 7}),
            HeaderMap::new(),
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.ends_with(b"\n"));

        let input: Input = read_json(&bytes).unwrap();
        assert_eq!(input.name, "Bolt");
        assert_eq!(input.supplier, 7);
    }
}
