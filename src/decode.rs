//! Lenient model decoding.
//!
//! Response bodies are parsed once into a JSON document. An optional
//! designated path (`"data"`, `"data.items"`, `"list.0"`) selects the member to
//! decode. Parseable content that does not fit the requested type degrades to
//! a default instead of failing; only bodies that are not JSON text at all
//! produce [`Error::Decode`].

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parses `bytes` as a JSON document.
///
/// An empty or whitespace-only body is read as `null`.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not UTF-8 or not JSON.
pub fn parse_document(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode {
        reason: format!("response is not UTF-8 text: {}", e),
        raw_response: String::from_utf8_lossy(bytes).into_owned(),
    })?;

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(text).map_err(|e| {
        tracing::error!(error = %e, raw_response = %text, "Response is not JSON");
        Error::Decode {
            reason: e.to_string(),
            raw_response: text.to_string(),
        }
    })
}

/// Walks a dotted path through objects and arrays.
///
/// An empty path selects the document itself.
///
/// ```
/// use conduit::decode::select_path;
/// use serde_json::json;
///
/// let doc = json!({"data": {"items": [{"id": 1}, {"id": 2}]}});
/// assert_eq!(select_path(&doc, "data.items.1.id"), Some(&json!(2)));
/// assert_eq!(select_path(&doc, "data.missing"), None);
/// ```
pub fn select_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.').try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn designated<'a>(document: &'a Value, path: Option<&str>) -> Option<&'a Value> {
    match path {
        Some(path) => select_path(document, path),
        None => Some(document),
    }
}

/// Decodes one `T` from the designated member, or returns `default`.
///
/// # Examples
///
/// ```
/// use conduit::decode::decode_object;
/// use serde::Deserialize;
///
/// #[derive(Debug, Default, Deserialize, PartialEq)]
/// struct User { id: u32, name: String }
///
/// let body = br#"{"code":0,"message":"ok","data":{"id":1,"name":"Joy"}}"#;
/// let user: User = decode_object(body, Some("data"), User::default()).unwrap();
/// assert_eq!(user, User { id: 1, name: "Joy".to_string() });
///
/// let missing: User = decode_object(body, Some("profile"), User::default()).unwrap();
/// assert_eq!(missing, User::default());
/// ```
pub fn decode_object<T>(bytes: &[u8], path: Option<&str>, default: T) -> Result<T>
where
    T: DeserializeOwned,
{
    let document = parse_document(bytes)?;
    Ok(object_from_document(&document, path, default))
}

pub(crate) fn object_from_document<T>(document: &Value, path: Option<&str>, default: T) -> T
where
    T: DeserializeOwned,
{
    match designated(document, path) {
        None | Some(Value::Null) => default,
        Some(value) => match T::deserialize(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, path = ?path, "Model did not match response, using default");
                default
            }
        },
    }
}

/// Decodes a sequence of `T` from the designated member.
///
/// A missing or non-array member yields an empty sequence. Elements that do
/// not decode are skipped.
pub fn decode_array<T>(bytes: &[u8], path: Option<&str>) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let document = parse_document(bytes)?;
    Ok(array_from_document(&document, path))
}

pub(crate) fn array_from_document<T>(document: &Value, path: Option<&str>) -> Vec<T>
where
    T: DeserializeOwned,
{
    match designated(document, path) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match T::deserialize(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping array element that did not match model");
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            tracing::warn!(path = ?path, "Expected an array in response");
            Vec::new()
        }
    }
}

/// Returns the designated member as raw JSON, `null` if missing.
pub fn decode_value(bytes: &[u8], path: Option<&str>) -> Result<Value> {
    let document = parse_document(bytes)?;
    Ok(designated(&document, path).cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn test_decode_object_from_data() {
        let body = br#"{"code":0,"message":"ok","data":{"id":1,"name":"Joy"}}"#;
        let user: User = decode_object(body, Some("data"), User::default()).unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "Joy".to_string()
            }
        );
    }

    #[test]
    fn test_decode_object_type_mismatch_degrades_to_default() {
        let body = br#"{"data":{"id":"one"}}"#;
        let fallback = User {
            id: 99,
            name: "fallback".to_string(),
        };
        let user: User = decode_object(body, Some("data"), fallback.clone()).unwrap();
        assert_eq!(user, fallback);
    }

    #[test]
    fn test_decode_object_null_member_uses_default() {
        let body = br#"{"data":null}"#;
        let user: User = decode_object(body, Some("data"), User::default()).unwrap();
        assert_eq!(user, User::default());
    }

    #[test]
    fn test_decode_object_without_path_uses_whole_document() {
        let body = br#"{"id":3,"name":"Ann"}"#;
        let user: User = decode_object(body, None, User::default()).unwrap();
        assert_eq!(user.id, 3);
    }

    #[test]
    fn test_decode_array_missing_path_is_empty() {
        let body = br#"{"code":0}"#;
        let users: Vec<User> = decode_array(body, Some("data")).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn test_decode_array_mismatched_member_is_empty() {
        let body = br#"{"data":{"id":1,"name":"Joy"}}"#;
        let users: Vec<User> = decode_array(body, Some("data")).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn test_decode_array_skips_bad_elements() {
        let body = br#"{"data":{"list":[{"id":1,"name":"a"},{"id":"x"},{"id":2,"name":"b"}]}}"#;
        let users: Vec<User> = decode_array(body, Some("data.list")).unwrap();
        assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_non_json_body_is_decode_error() {
        let result: Result<Vec<User>> = decode_array(b"<html>oops</html>", Some("data"));
        match result {
            Err(Error::Decode { raw_response, .. }) => assert_eq!(raw_response, "<html>oops</html>"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let result = decode_value(&[0xff, 0xfe, 0x00], None);
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_empty_body_reads_as_null() {
        assert_eq!(decode_value(b"  ", None).unwrap(), Value::Null);
        let user: User = decode_object(b"", Some("data"), User::default()).unwrap();
        assert_eq!(user, User::default());
    }

    #[test]
    fn test_select_path_indexes_arrays() {
        let doc = json!({"a": [10, {"b": true}]});
        assert_eq!(select_path(&doc, "a.1.b"), Some(&json!(true)));
        assert_eq!(select_path(&doc, "a.x"), None);
        assert_eq!(select_path(&doc, ""), Some(&doc));
    }
}
