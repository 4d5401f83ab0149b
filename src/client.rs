//! The funnel every outbound call goes through.
//!
//! [`Client`] builds a request from the shared [`Config`] and a [`Target`],
//! dispatches it, logs both ends, applies business-code interception and
//! decodes the model. Each operation exists in two forms: an `async fn`
//! returning an [`Outcome`], and a `*_with` variant taking success and
//! failure callbacks that run on a [`CallbackQueue`]. Use [`ClientBuilder`]
//! to configure and create clients.

use crate::{
    bridge::{CallbackQueue, Completion},
    config::{Config, ConfigSnapshot, ConfigUpdate, Environment},
    decode,
    dispatch::{Dispatcher, RawResponse},
    envelope::{self, Task},
    intercept::{self, Classification},
    logger::{LogSink, Received, RequestId, RequestLogger, StderrSink},
    target::Target,
    Error, Outcome, Response,
};
use futures_util::FutureExt;
use http::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use url::Url;

/// A client for making API calls through one shared configuration.
///
/// The client is cheap to clone; clones share configuration, connection pool
/// and logger.
///
/// # Examples
///
/// ```no_run
/// use conduit::{Client, Environment, Outcome, Target};
/// use serde::Deserialize;
///
/// #[derive(Debug, Default, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), conduit::Error> {
/// let client = Client::builder()
///     .environment(Environment::Production)
///     .default_header("Authorization", "Bearer X")?
///     .build()?;
///
/// client.config().register_listener_codes([4001], |code| {
///     eprintln!("session expired ({})", code);
/// });
///
/// match client
///     .request_object(Target::get("/users/1"), Some("data"), User::default())
///     .await
/// {
///     Outcome::Success(user) => println!("User: {}", user.data.name),
///     Outcome::Failure(e) => eprintln!("failed: {}", e),
///     Outcome::Intercepted(_) => {}
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dispatcher: Dispatcher,
    config: Config,
    logger: RequestLogger,
    callback_queue: CallbackQueue,
    runtime: Option<Handle>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The shared configuration. Updates apply to every call built afterwards.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.inner.logger
    }

    /// Decodes one model from the designated member, or `default` if the
    /// member is missing or does not match.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use conduit::{Client, Target};
    /// use serde::Deserialize;
    ///
    /// #[derive(Debug, Default, Deserialize)]
    /// struct Profile { nickname: String }
    ///
    /// # async fn example() -> Result<(), conduit::Error> {
    /// let client = Client::builder().base_url("https://api.example.com")?.build()?;
    /// let outcome = client
    ///     .request_object(Target::get("/profile"), Some("data"), Profile::default())
    ///     .await;
    /// if let Some(Ok(profile)) = outcome.into_result() {
    ///     println!("{}", profile.nickname);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request_object<T>(&self, target: Target, path: Option<&str>, default: T) -> Outcome<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.map(str::to_string);
        self.await_outcome(target, move |document| {
            decode::object_from_document(document, path.as_deref(), default)
        })
        .await
    }

    /// Decodes a sequence of models from the designated member.
    pub async fn request_array<T>(&self, target: Target, path: Option<&str>) -> Outcome<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.map(str::to_string);
        self.await_outcome(target, move |document| {
            decode::array_from_document(document, path.as_deref())
        })
        .await
    }

    /// Returns the designated member as raw JSON, `null` if missing.
    pub async fn request_json(&self, target: Target, path: Option<&str>) -> Outcome<serde_json::Value> {
        let path = path.map(str::to_string);
        self.await_outcome(target, move |document| select(document, path.as_deref()))
            .await
    }

    /// Downloads to the target's destination and returns the saved path.
    ///
    /// Plain targets are turned into downloads with the default destination.
    pub async fn download(&self, target: Target) -> Outcome<PathBuf> {
        let target = into_download(target);
        saved_path(self.await_outcome(target, |_| ()).await)
    }

    /// Callback form of [`request_object`](Client::request_object).
    ///
    /// Exactly one of `on_success` and `on_failure` runs, on `queue` or the
    /// client's default queue, unless the call is intercepted, in which case
    /// neither runs.
    pub fn request_object_with<T, S, F>(
        &self,
        target: Target,
        path: Option<&str>,
        default: T,
        queue: Option<CallbackQueue>,
        on_success: S,
        on_failure: F,
    ) where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(Response<T>) + Send + 'static,
        F: FnOnce(Error) + Send + 'static,
    {
        let path = path.map(str::to_string);
        self.callback_outcome(
            target,
            queue,
            move |document| decode::object_from_document(document, path.as_deref(), default),
            on_success,
            on_failure,
        );
    }

    /// Callback form of [`request_array`](Client::request_array).
    pub fn request_array_with<T, S, F>(
        &self,
        target: Target,
        path: Option<&str>,
        queue: Option<CallbackQueue>,
        on_success: S,
        on_failure: F,
    ) where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(Response<Vec<T>>) + Send + 'static,
        F: FnOnce(Error) + Send + 'static,
    {
        let path = path.map(str::to_string);
        self.callback_outcome(
            target,
            queue,
            move |document| decode::array_from_document(document, path.as_deref()),
            on_success,
            on_failure,
        );
    }

    /// Callback form of [`request_json`](Client::request_json).
    pub fn request_json_with<S, F>(
        &self,
        target: Target,
        path: Option<&str>,
        queue: Option<CallbackQueue>,
        on_success: S,
        on_failure: F,
    ) where
        S: FnOnce(Response<serde_json::Value>) + Send + 'static,
        F: FnOnce(Error) + Send + 'static,
    {
        let path = path.map(str::to_string);
        self.callback_outcome(
            target,
            queue,
            move |document| select(document, path.as_deref()),
            on_success,
            on_failure,
        );
    }

    /// Callback form of [`download`](Client::download).
    pub fn download_with<S, F>(
        &self,
        target: Target,
        queue: Option<CallbackQueue>,
        on_success: S,
        on_failure: F,
    ) where
        S: FnOnce(Response<PathBuf>) + Send + 'static,
        F: FnOnce(Error) + Send + 'static,
    {
        let queue = queue.unwrap_or_else(|| self.inner.callback_queue.clone());
        let delivery = deliver(queue.clone(), on_success, on_failure);
        let completion =
            Completion::callback(move |outcome: Outcome<()>| delivery(saved_path(outcome)));
        self.spawn(into_download(target), queue, |_| (), completion);
    }

    async fn await_outcome<T, D>(&self, target: Target, decode_model: D) -> Outcome<T>
    where
        T: Send + 'static,
        D: FnOnce(&serde_json::Value) -> T + Send + 'static,
    {
        let (completion, settlement) = Completion::channel();
        self.spawn(target, self.inner.callback_queue.clone(), decode_model, completion);
        settlement.await.unwrap_or_else(Outcome::Failure)
    }

    fn callback_outcome<T, D, S, F>(
        &self,
        target: Target,
        queue: Option<CallbackQueue>,
        decode_model: D,
        on_success: S,
        on_failure: F,
    ) where
        T: Send + 'static,
        D: FnOnce(&serde_json::Value) -> T + Send + 'static,
        S: FnOnce(Response<T>) + Send + 'static,
        F: FnOnce(Error) + Send + 'static,
    {
        let queue = queue.unwrap_or_else(|| self.inner.callback_queue.clone());
        let completion = Completion::callback(deliver(queue.clone(), on_success, on_failure));
        self.spawn(target, queue, decode_model, completion);
    }

    /// Runs the pipeline off the caller's task and settles `completion` once.
    fn spawn<T, D>(
        &self,
        target: Target,
        queue: CallbackQueue,
        decode_model: D,
        completion: Completion<Outcome<T>>,
    ) where
        T: Send + 'static,
        D: FnOnce(&serde_json::Value) -> T + Send + 'static,
    {
        let runtime = match self.inner.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                completion.settle(Outcome::Failure(Error::Configuration(
                    "No tokio runtime available to run the request".to_string(),
                )));
                return;
            }
        };

        let inner = self.inner.clone();
        runtime.spawn(async move {
            // User handlers and decoders run inside the pipeline; a panic there
            // still settles the call.
            let outcome = AssertUnwindSafe(inner.execute(target, &queue, decode_model))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("Request pipeline panicked");
                    Outcome::Failure(Error::Internal("request pipeline panicked".to_string()))
                });
            completion.settle(outcome);
        });
    }
}

impl ClientInner {
    async fn execute<T, D>(&self, target: Target, queue: &CallbackQueue, decode_model: D) -> Outcome<T>
    where
        D: FnOnce(&serde_json::Value) -> T,
    {
        let snapshot = self.config.snapshot();
        let envelope = match envelope::build(&target, &snapshot) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, path = %target.path, "Request could not be built");
                return Outcome::Failure(e);
            }
        };

        let id = RequestId::next();
        self.logger
            .on_send(id, envelope.summary(), snapshot.debug_logging);

        let start = Instant::now();
        let result = self.dispatcher.send(&envelope, id).await;
        let latency = start.elapsed();

        self.logger
            .on_receive(id, &received(&result), snapshot.debug_logging);

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    request_id = id.get(),
                    method = %envelope.method,
                    path = %envelope.path,
                    "Request failed"
                );
                return Outcome::Failure(e);
            }
        };

        tracing::info!(
            request_id = id.get(),
            status = raw.status.as_u16(),
            latency_ms = latency.as_millis(),
            "Received HTTP response"
        );

        let classification = match envelope.task {
            Task::Download { .. } => classify_download(&raw, &snapshot),
            _ => intercept::classify(raw.status.as_u16(), &raw.body, &snapshot, queue),
        };

        match classification {
            Classification::StatusError { body, .. } => Outcome::Failure(Error::Status {
                status: raw.status,
                path: envelope.path,
                raw_response: body,
            }),
            Classification::Intercepted(interception) => Outcome::Intercepted(interception),
            Classification::PassThrough {
                document,
                code,
                message,
            } => {
                let document = match document {
                    Some(document) => document,
                    None => match decode::parse_document(&raw.body) {
                        Ok(document) => document,
                        Err(e) => return Outcome::Failure(e),
                    },
                };
                let data = decode_model(&document);
                Outcome::Success(Response {
                    data,
                    raw_body: String::from_utf8_lossy(&raw.body).into_owned(),
                    status: raw.status,
                    headers: raw.headers,
                    latency,
                    code,
                    message,
                    saved_to: raw.saved_to,
                })
            }
        }
    }
}

fn classify_download(raw: &RawResponse, config: &ConfigSnapshot) -> Classification {
    if raw.status.as_u16() != config.success_status {
        return Classification::StatusError {
            status: raw.status.as_u16(),
            body: String::from_utf8_lossy(&raw.body).into_owned(),
        };
    }
    Classification::PassThrough {
        document: Some(serde_json::Value::Null),
        code: None,
        message: None,
    }
}

fn received(result: &crate::Result<RawResponse>) -> Received {
    match result {
        Ok(raw) => Received::Response {
            status: raw.status.as_u16(),
            body: match &raw.saved_to {
                Some(path) => format!("<saved to {}>", path.display()),
                None => String::from_utf8_lossy(&raw.body).into_owned(),
            },
        },
        Err(e) => Received::Failure(e.to_string()),
    }
}

fn select(document: &serde_json::Value, path: Option<&str>) -> serde_json::Value {
    match path {
        Some(path) => decode::select_path(document, path)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        None => document.clone(),
    }
}

fn into_download(target: Target) -> Target {
    if target.kind == crate::target::RequestKind::Download {
        target
    } else {
        let destination = target.download_destination.clone();
        target.download(destination)
    }
}

fn saved_path(outcome: Outcome<()>) -> Outcome<PathBuf> {
    match outcome {
        Outcome::Success(response) => match response.saved_to.clone() {
            Some(path) => Outcome::Success(response.map(|_| path)),
            None => Outcome::Failure(Error::Internal(
                "download finished without a saved file".to_string(),
            )),
        },
        Outcome::Failure(e) => Outcome::Failure(e),
        Outcome::Intercepted(interception) => Outcome::Intercepted(interception),
    }
}

fn deliver<T, S, F>(queue: CallbackQueue, on_success: S, on_failure: F) -> impl FnOnce(Outcome<T>) + Send + 'static
where
    T: Send + 'static,
    S: FnOnce(Response<T>) + Send + 'static,
    F: FnOnce(Error) + Send + 'static,
{
    move |outcome| match outcome {
        Outcome::Success(response) => queue.execute(move || on_success(response)),
        Outcome::Failure(error) => queue.execute(move || on_failure(error)),
        Outcome::Intercepted(interception) => {
            tracing::debug!(code = interception.code, "Call intercepted, no callback delivered");
        }
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use conduit::{ClientBuilder, Environment};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), conduit::Error> {
/// let client = ClientBuilder::new()
///     .environment(Environment::Staging)
///     .timeout(Duration::from_secs(15))
///     .default_header("User-Agent", "my-app/1.0")?
///     .default_parameter("platform", "ios")
///     .debug_logging(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    environment: Option<Environment>,
    default_headers: HashMap<String, String>,
    default_parameters: serde_json::Map<String, serde_json::Value>,
    timeout: Duration,
    success_status: u16,
    debug_logging: bool,
    callback_queue: CallbackQueue,
    log_sink: Arc<dyn LogSink>,
    runtime: Option<Handle>,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            environment: None,
            default_headers: HashMap::new(),
            default_parameters: serde_json::Map::new(),
            timeout: crate::config::DEFAULT_TIMEOUT,
            success_status: crate::config::DEFAULT_SUCCESS_STATUS,
            debug_logging: false,
            callback_queue: CallbackQueue::immediate(),
            log_sink: Arc::new(StderrSink),
            runtime: None,
            http_client: None,
        }
    }

    /// Sets the base URL for all requests. Takes precedence over [`environment`](Self::environment).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> crate::Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Selects an environment and its fixed base URL.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Adds a header included in every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> crate::Result<Self> {
        HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers
            .insert(name.as_ref().to_string(), value.as_ref().to_string());
        Ok(self)
    }

    /// Adds a parameter included in every request.
    pub fn default_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.default_parameters.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the only HTTP status treated as success. Defaults to 200.
    pub fn success_status(mut self, status: u16) -> Self {
        self.success_status = status;
        self
    }

    /// Enables the combined request/response log records.
    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Sets the default queue for callbacks and listener notifications.
    pub fn callback_queue(mut self, queue: CallbackQueue) -> Self {
        self.callback_queue = queue;
        self
    }

    /// Sets where combined log records go.
    ///
    /// Defaults to [`StderrSink`]. Use [`TracingSink`](crate::TracingSink) to
    /// route records through the application's `tracing` subscriber instead.
    pub fn log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.log_sink = Arc::new(sink);
        self
    }

    /// Sets the runtime that runs requests. Defaults to the runtime current at call time.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Uses an existing `reqwest` client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// A base URL is not required here; a call without one fails with
    /// [`Error::Configuration`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(self) -> crate::Result<Client> {
        let dispatcher = match self.http_client {
            Some(client) => Dispatcher::with_client(client),
            None => Dispatcher::new()?,
        };

        let config = Config::from_snapshot(ConfigSnapshot {
            timeout: self.timeout,
            success_status: self.success_status,
            debug_logging: self.debug_logging,
            ..ConfigSnapshot::default()
        });
        if let Some(environment) = self.environment {
            config.set_environment(environment);
        }
        let mut update = ConfigUpdate::new()
            .headers(self.default_headers)
            .parameters(self.default_parameters);
        if let Some(url) = self.base_url {
            update = update.base_url(url);
        }
        config.update(update);

        Ok(Client {
            inner: Arc::new(ClientInner {
                dispatcher,
                config,
                logger: RequestLogger::new(self.log_sink),
                callback_queue: self.callback_queue,
                runtime: self.runtime,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
