//! Request construction.
//!
//! [`build`] merges a [`ConfigSnapshot`] with a [`Target`] into a fully
//! resolved [`RequestEnvelope`]. It performs no I/O.

use crate::{
    config::ConfigSnapshot,
    target::{ContentType, DownloadDestination, Method, MultipartPart, RequestKind, Target},
    Error, Result,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

/// A regular request body, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Json(Vec<u8>),
    Form(String),
}

/// The concrete transport task for a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Regular { body: Body },
    Upload { parts: Vec<MultipartPart> },
    Download { destination: DownloadDestination },
}

/// A request with every default applied and every override resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub method: Method,
    pub url: Url,
    /// The target path, kept for error context.
    pub path: String,
    /// Merged headers, `Content-Type` included.
    pub headers: BTreeMap<String, String>,
    /// Merged parameters.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub content_type: ContentType,
    pub task: Task,
    pub timeout: Duration,
    /// The only status whose download body is written to disk.
    pub success_status: u16,
}

impl RequestEnvelope {
    /// Renders the request half of a log record.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", self.method, self.url);
        for (name, value) in &self.headers {
            let _ = writeln!(out, "  {}: {}", name, value);
        }
        match &self.task {
            Task::Regular { body: Body::Empty } => {}
            Task::Regular {
                body: Body::Json(bytes),
            } => {
                let _ = writeln!(out, "  body: {}", String::from_utf8_lossy(bytes));
            }
            Task::Regular {
                body: Body::Form(form),
            } => {
                let _ = writeln!(out, "  body: {}", form);
            }
            Task::Upload { parts } => {
                for part in parts {
                    let _ = writeln!(
                        out,
                        "  part: {} file={} mime={}",
                        part.field_name,
                        part.file_name.as_deref().unwrap_or("-"),
                        part.mime_type.as_deref().unwrap_or("-"),
                    );
                }
            }
            Task::Download { destination } => {
                let _ = writeln!(out, "  download to: {}", destination.directory.display());
            }
        }
        out
    }
}

/// Builds the envelope for `target` against `config`.
///
/// Per-call headers and parameters replace common ones key by key.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when neither the target nor the
/// configuration supplies a base URL, [`Error::InvalidUrl`] when the joined
/// URL does not parse and [`Error::Serialization`] when parameters cannot be
/// encoded.
///
/// # Examples
///
/// ```
/// use conduit::{envelope, Config, ConfigUpdate, Target};
///
/// let config = Config::new();
/// config.update(
///     ConfigUpdate::new()
///         .base_url("https://api.example.com".parse().unwrap())
///         .header("Authorization", "Bearer X"),
/// );
///
/// let envelope = envelope::build(&Target::get("/users?page=2"), &config.snapshot()).unwrap();
/// assert_eq!(envelope.url.as_str(), "https://api.example.com/users?page=2");
/// assert_eq!(envelope.headers["Authorization"], "Bearer X");
/// ```
pub fn build(target: &Target, config: &ConfigSnapshot) -> Result<RequestEnvelope> {
    let mut url = resolve_url(target, config)?;

    let mut parameters = config.common_parameters.clone();
    if let Some(overrides) = &target.parameters {
        for (key, value) in overrides {
            parameters.insert(key.clone(), value.clone());
        }
    }

    let content_type = match target.kind {
        RequestKind::Upload => ContentType::Multipart,
        _ => target.content_type,
    };

    let mut headers: BTreeMap<String, String> = config
        .common_headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(overrides) = &target.headers {
        for (key, value) in overrides {
            // Header names are case-insensitive on the wire.
            headers.retain(|name, _| !name.eq_ignore_ascii_case(key));
            headers.insert(key.clone(), value.clone());
        }
    }
    headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
    headers.insert("Content-Type".to_string(), content_type.mime().to_string());

    let task = match target.kind {
        RequestKind::Regular => {
            if target.method.uses_query() {
                append_query(&mut url, &parameters);
                Task::Regular { body: Body::Empty }
            } else {
                encode_body(content_type, &parameters)?
            }
        }
        RequestKind::Upload => {
            append_query(&mut url, &parameters);
            Task::Upload {
                parts: target.parts.clone(),
            }
        }
        RequestKind::Download => {
            append_query(&mut url, &parameters);
            Task::Download {
                destination: target.download_destination.clone().unwrap_or_default(),
            }
        }
    };

    // A multipart type without a body has no boundary to announce.
    if content_type == ContentType::Multipart && matches!(task, Task::Regular { .. }) {
        headers.remove("Content-Type");
    }

    Ok(RequestEnvelope {
        method: target.method,
        url,
        path: target.path.clone(),
        headers,
        parameters,
        content_type,
        task,
        timeout: config.timeout,
        success_status: config.success_status,
    })
}

fn resolve_url(target: &Target, config: &ConfigSnapshot) -> Result<Url> {
    let base = match (&target.base_url_override, &config.base_url) {
        (Some(base), _) => base.as_str(),
        (None, Some(base)) => base.as_str(),
        (None, None) => {
            return Err(Error::Configuration(
                "No base URL configured for request".to_string(),
            ))
        }
    };

    let base = base.trim_end_matches('/');
    let joined = if target.path.is_empty() {
        base.to_string()
    } else if target.path.starts_with('/') {
        format!("{}{}", base, target.path)
    } else {
        format!("{}/{}", base, target.path)
    };

    Ok(Url::parse(&joined)?)
}

fn append_query(url: &mut Url, parameters: &serde_json::Map<String, serde_json::Value>) {
    if parameters.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in parameters {
        pairs.append_pair(key, &parameter_text(value));
    }
}

fn encode_body(
    content_type: ContentType,
    parameters: &serde_json::Map<String, serde_json::Value>,
) -> Result<Task> {
    if parameters.is_empty() && content_type != ContentType::Multipart {
        return Ok(Task::Regular { body: Body::Empty });
    }

    let task = match content_type {
        ContentType::Json => {
            let bytes = serde_json::to_vec(parameters)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            Task::Regular {
                body: Body::Json(bytes),
            }
        }
        ContentType::UrlEncoded => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in parameters {
                serializer.append_pair(key, &parameter_text(value));
            }
            Task::Regular {
                body: Body::Form(serializer.finish()),
            }
        }
        // Without an explicit upload, parameters become text fields.
        ContentType::Multipart => Task::Upload {
            parts: parameters
                .iter()
                .map(|(key, value)| MultipartPart::bytes(key.clone(), parameter_text(value)))
                .collect(),
        },
    };
    Ok(task)
}

/// Text form of a parameter for query strings and form bodies.
pub(crate) fn parameter_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigUpdate};
    use crate::target::{FileNaming, MultipartPart};
    use serde_json::json;

    fn config_with_base(base: &str) -> ConfigSnapshot {
        let config = Config::new();
        config.update(ConfigUpdate::new().base_url(Url::parse(base).unwrap()));
        config.snapshot()
    }

    #[test]
    fn test_target_headers_override_common_headers() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .header("Authorization", "Bearer X")
                .header("X-App", "1"),
        );

        let target = Target::get("/me").with_header("Authorization", "Bearer Y");
        let envelope = build(&target, &config.snapshot()).unwrap();

        assert_eq!(envelope.headers["Authorization"], "Bearer Y");
        assert_eq!(envelope.headers["X-App"], "1");
    }

    #[test]
    fn test_target_parameters_override_common_parameters() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .parameter("lang", "en")
                .parameter("v", 1),
        );

        let target = Target::post("/search").with_parameter("lang", "fr");
        let envelope = build(&target, &config.snapshot()).unwrap();

        assert_eq!(envelope.parameters["lang"], json!("fr"));
        assert_eq!(envelope.parameters["v"], json!(1));
        match envelope.task {
            Task::Regular {
                body: Body::Json(bytes),
            } => {
                let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(body, json!({"lang": "fr", "v": 1}));
            }
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    #[test]
    fn test_override_is_not_a_deep_merge() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .parameter("filter", json!({"a": 1, "b": 2})),
        );

        let target = Target::post("/items").with_parameter("filter", json!({"a": 9}));
        let envelope = build(&target, &config.snapshot()).unwrap();
        assert_eq!(envelope.parameters["filter"], json!({"a": 9}));
    }

    #[test]
    fn test_get_scenario_with_query_in_path() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .header("Authorization", "Bearer X"),
        );

        let target = Target::get("/users?page=2").with_headers(std::collections::HashMap::new());
        let envelope = build(&target, &config.snapshot()).unwrap();

        assert_eq!(envelope.method, Method::Get);
        assert_eq!(envelope.url.as_str(), "https://api.example.com/users?page=2");
        assert_eq!(envelope.headers["Authorization"], "Bearer X");
        assert_eq!(envelope.task, Task::Regular { body: Body::Empty });
    }

    #[test]
    fn test_get_parameters_go_to_query() {
        let config = config_with_base("https://api.example.com/v1/");
        let target = Target::get("users?page=2").with_parameter("size", 20);
        let envelope = build(&target, &config).unwrap();
        assert_eq!(
            envelope.url.as_str(),
            "https://api.example.com/v1/users?page=2&size=20"
        );
    }

    #[test]
    fn test_missing_base_url_is_configuration_error() {
        let result = build(&Target::get("/x"), &Config::new().snapshot());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_base_url_override_wins() {
        let config = config_with_base("https://api.example.com");
        let target = Target::get("/ping").with_base_url("https://cdn.example.com/");
        let envelope = build(&target, &config).unwrap();
        assert_eq!(envelope.url.as_str(), "https://cdn.example.com/ping");

        let no_config = Config::new().snapshot();
        assert!(build(&target, &no_config).is_ok());
    }

    #[test]
    fn test_content_type_is_forced() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .header("content-type", "text/plain"),
        );
        let target = Target::put("/x").with_content_type(ContentType::UrlEncoded);
        let envelope = build(&target, &config.snapshot()).unwrap();

        assert!(!envelope.headers.contains_key("content-type"));
        assert_eq!(
            envelope.headers["Content-Type"],
            "application/x-www-form-urlencoded; charset=utf-8"
        );
    }

    #[test]
    fn test_url_encoded_body() {
        let config = config_with_base("https://api.example.com");
        let target = Target::delete("/session")
            .with_content_type(ContentType::UrlEncoded)
            .with_parameter("reason", "log out")
            .with_parameter("all", true);
        let envelope = build(&target, &config).unwrap();
        assert_eq!(
            envelope.task,
            Task::Regular {
                body: Body::Form("all=true&reason=log+out".to_string())
            }
        );
        assert!(envelope.url.query().is_none());
    }

    #[test]
    fn test_upload_pairs_parts_with_query_parameters() {
        let config = config_with_base("https://api.example.com");
        let target = Target::post("/avatar")
            .with_parameter("uid", 7)
            .upload([MultipartPart::bytes("file", b"abc".to_vec())]);
        let envelope = build(&target, &config).unwrap();

        assert_eq!(envelope.url.query(), Some("uid=7"));
        assert_eq!(envelope.content_type, ContentType::Multipart);
        match envelope.task {
            Task::Upload { parts } => assert_eq!(parts[0].field_name, "file"),
            other => panic!("expected upload, got {:?}", other),
        }
    }

    #[test]
    fn test_download_uses_default_destination() {
        let config = config_with_base("https://api.example.com");
        let envelope = build(&Target::get("/files/a.zip").download(None), &config).unwrap();
        match envelope.task {
            Task::Download { destination } => {
                assert_eq!(destination.naming, FileNaming::Suggested);
                assert!(destination.directory.starts_with(std::env::temp_dir()));
            }
            other => panic!("expected download, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_lists_request_details() {
        let config = config_with_base("https://api.example.com");
        let target = Target::post("/login").with_parameter("user", "joy");
        let summary = build(&target, &config).unwrap().summary();
        assert!(summary.starts_with("POST https://api.example.com/login"));
        assert!(summary.contains("Content-Type: application/json"));
        assert!(summary.contains(r#"body: {"user":"joy"}"#));
    }

    #[test]
    fn test_target_header_wins_regardless_of_case() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .base_url(Url::parse("https://api.example.com").unwrap())
                .header("authorization", "Bearer COMMON"),
        );
        let target = Target::get("/me").with_header("Authorization", "Bearer TARGET");

        let envelope = build(&target, &config.snapshot()).unwrap();

        let values: Vec<_> = envelope
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(values, vec!["Bearer TARGET"]);
    }

    #[test]
    fn test_multipart_without_parameters_has_no_bare_content_type() {
        let config = config_with_base("https://api.example.com");

        let post = Target::post("/form").with_content_type(ContentType::Multipart);
        let envelope = build(&post, &config).unwrap();
        assert_eq!(envelope.task, Task::Upload { parts: Vec::new() });

        let get = Target::get("/form").with_content_type(ContentType::Multipart);
        let envelope = build(&get, &config).unwrap();
        assert_eq!(envelope.task, Task::Regular { body: Body::Empty });
        assert!(!envelope
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type")));
    }
}
