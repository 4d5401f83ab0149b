//! # Conduit - A single funnel for outbound API calls
//!
//! Conduit routes every API call an application makes through one pipeline
//! built on top of `reqwest`. Calls share one configuration (base URL,
//! environment, common headers and parameters, timeout), are logged as one
//! combined request/response record, pass through business-code interception
//! and are decoded leniently into typed models.
//!
//! ## Quick Start
//!
//! ```no_run
//! use conduit::{Client, Environment, Outcome, Target};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), conduit::Error> {
//!     let client = Client::builder()
//!         .environment(Environment::Production)
//!         .default_header("Authorization", "Bearer X")?
//!         .debug_logging(true)
//!         .build()?;
//!
//!     // Decode the `data` member of `{"code":0,"message":"ok","data":{...}}`
//!     let outcome = client
//!         .request_object(Target::get("/users/1"), Some("data"), User::default())
//!         .await;
//!
//!     match outcome {
//!         Outcome::Success(user) => {
//!             println!("User: {}", user.data.name);
//!             println!("Request took {:?}", user.latency);
//!         }
//!         Outcome::Failure(e) => eprintln!("Call failed: {}", e),
//!         Outcome::Intercepted(i) => eprintln!("Handled globally (code {})", i.code),
//!     }
//!
//!     let users: Vec<User> = client
//!         .request_array(Target::get("/users").with_parameter("page", 2), Some("data"))
//!         .await
//!         .success()
//!         .map(|response| response.data)
//!         .unwrap_or_default();
//!     println!("Fetched {} users", users.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Shared configuration** - One [`Config`] with environments, common headers and parameters
//! - **Declarative targets** - Plain request, JSON/form body, multipart upload or download
//! - **Business-code interception** - Listener codes and intercept handlers for codes like "session expired"
//! - **Lenient decoding** - Missing or mismatched members fall back to defaults instead of failing
//! - **Combined logging** - One record per call through a pluggable [`LogSink`], plus `tracing` events
//! - **Await or callbacks** - Every operation exists as an `async fn` and as a callback variant
//!
//! ## Interception
//!
//! ```no_run
//! use conduit::{Client, Outcome, Target};
//!
//! # async fn example() -> Result<(), conduit::Error> {
//! let client = Client::builder().base_url("https://api.example.com")?.build()?;
//!
//! // Expired sessions are handled in one place; the caller sees no callback.
//! client.config().register_listener_codes([4001], |code| {
//!     eprintln!("Session expired ({}), showing login", code);
//! });
//!
//! // Handlers decide per response whether to consume it.
//! client.config().register_intercept_codes([3001], |code, message, _body| {
//!     eprintln!("Maintenance notice {}: {}", code, message);
//!     true
//! });
//!
//! let outcome = client.request_json(Target::get("/feed"), Some("data")).await;
//! if let Outcome::Intercepted(interception) = outcome {
//!     println!("Withheld by {:?}", interception.kind);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use conduit::{Client, Error, Outcome, Target};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.request_json(Target::get("/endpoint"), None).await {
//!     Outcome::Success(response) => println!("Success: {:?}", response.data),
//!     Outcome::Failure(Error::Status { status, raw_response, .. }) => {
//!         eprintln!("HTTP error {}: {}", status, raw_response);
//!     }
//!     Outcome::Failure(Error::Decode { reason, raw_response }) => {
//!         eprintln!("Unreadable body ({}): {}", reason, raw_response);
//!     }
//!     Outcome::Failure(e) if e.is_timeout() => eprintln!("Timed out"),
//!     Outcome::Failure(e) => eprintln!("Other error: {}", e),
//!     Outcome::Intercepted(_) => {}
//! }
//! # Ok(())
//! # }
//! ```

pub mod bridge;
mod client;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod envelope;
mod error;
pub mod intercept;
pub mod logger;
mod response;
pub mod target;

pub use bridge::{CallbackQueue, Completion, MainQueue, Settlement};
pub use client::{Client, ClientBuilder};
pub use config::{Config, ConfigSnapshot, ConfigUpdate, Environment};
pub use error::{Error, Result, TransportErrorKind};
pub use intercept::{InterceptKind, Interception};
pub use logger::{LogSink, RequestId, RequestLogger, StderrSink, TracingSink};
pub use response::{Outcome, Response};
pub use target::{
    ContentType, DownloadDestination, FileNaming, Method, MultipartPart, PartSource, RequestKind,
    Target,
};
