//! Endpoint descriptors.
//!
//! A [`Target`] is plain data describing one logical call: where it goes, how
//! it is encoded and which per-call headers and parameters override the shared
//! configuration. Targets are built per call and handed to the client by value.

use http::Method as HttpMethod;
use std::collections::HashMap;
use std::path::PathBuf;

/// The HTTP methods the funnel dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub(crate) fn to_http(self) -> HttpMethod {
        match self {
            Method::Get => HttpMethod::GET,
            Method::Post => HttpMethod::POST,
            Method::Put => HttpMethod::PUT,
            Method::Delete => HttpMethod::DELETE,
        }
    }

    /// Returns `true` if parameters travel in the query string rather than the body.
    pub fn uses_query(self) -> bool {
        matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_http().as_str())
    }
}

/// How the request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Json,
    UrlEncoded,
    Multipart,
}

impl ContentType {
    /// The `Content-Type` header value for this encoding.
    ///
    /// For multipart bodies the transport appends the boundary.
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::UrlEncoded => "application/x-www-form-urlencoded; charset=utf-8",
            ContentType::Multipart => "multipart/form-data",
        }
    }
}

/// The shape of the transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestKind {
    #[default]
    Regular,
    Upload,
    Download,
}

/// Where the bytes of a multipart part come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartSource {
    Bytes(Vec<u8>),
    /// Read when the request is dispatched.
    File(PathBuf),
}

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub source: PartSource,
    pub field_name: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl MultipartPart {
    pub fn bytes(field_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: PartSource::Bytes(bytes.into()),
            field_name: field_name.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn file(field_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source: PartSource::File(path.into()),
            field_name: field_name.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// How a downloaded file is named inside its destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileNaming {
    /// Last segment of the request URL path, or a generated name if there is none.
    #[default]
    Suggested,
    Fixed(String),
    /// `<prefix>-<request id>`.
    Generated { prefix: String },
}

/// Directory and naming rule for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDestination {
    pub directory: PathBuf,
    pub naming: FileNaming,
}

impl DownloadDestination {
    pub fn new(directory: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            directory: directory.into(),
            naming,
        }
    }
}

impl Default for DownloadDestination {
    /// `<temp dir>/conduit-downloads` with suggested names.
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("conduit-downloads"),
            naming: FileNaming::Suggested,
        }
    }
}

/// Description of one logical endpoint call.
///
/// # Examples
///
/// ```
/// use conduit::{ContentType, Method, Target};
///
/// let target = Target::post("/session")
///     .with_header("X-Device", "ios")
///     .with_parameter("user", "joy")
///     .with_content_type(ContentType::UrlEncoded);
///
/// assert_eq!(target.method, Method::Post);
/// assert_eq!(target.headers.as_ref().unwrap()["X-Device"], "ios");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Replaces the configured base URL for this call only.
    pub base_url_override: Option<String>,

    /// Path appended to the base URL. May carry its own query string.
    pub path: String,

    pub method: Method,

    /// Per-call headers; these win over the common headers.
    pub headers: Option<HashMap<String, String>>,

    /// Per-call parameters; these win over the common parameters.
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,

    pub kind: RequestKind,

    pub content_type: ContentType,

    /// Parts of an upload, in order.
    pub parts: Vec<MultipartPart>,

    /// Only consulted for downloads.
    pub download_destination: Option<DownloadDestination>,
}

impl Target {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            base_url_override: None,
            path: path.into(),
            method,
            headers: None,
            parameters: None,
            kind: RequestKind::Regular,
            content_type: ContentType::Json,
            parts: Vec::new(),
            download_destination: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Turns this target into a multipart upload of `parts`.
    pub fn upload(mut self, parts: impl IntoIterator<Item = MultipartPart>) -> Self {
        self.kind = RequestKind::Upload;
        self.content_type = ContentType::Multipart;
        self.parts.extend(parts);
        self
    }

    /// Turns this target into a download. `None` uses the default destination.
    pub fn download(mut self, destination: Option<DownloadDestination>) -> Self {
        self.kind = RequestKind::Download;
        self.download_destination = destination;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.get_or_insert_with(HashMap::new).extend(headers);
        self
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters
            .get_or_insert_with(serde_json::Map::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(
        mut self,
        parameters: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        self.parameters
            .get_or_insert_with(serde_json::Map::new)
            .extend(parameters);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::get("")
    }
}
