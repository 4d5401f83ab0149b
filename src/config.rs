//! Shared, mutable configuration for every call made through a [`Client`](crate::Client).
//!
//! A [`Config`] is a cheap, cloneable handle to one configuration instance.
//! Start-up code fills it in, feature code may later register intercept or
//! listener codes, and every call takes a [`ConfigSnapshot`] at build time so
//! that in-flight requests never observe a half-applied update.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Handler for intercept codes: `(code, message, full body) -> handled`.
///
/// Returning `true` suppresses normal delivery to the caller.
pub type InterceptHandler = Arc<dyn Fn(i64, &str, &serde_json::Value) -> bool + Send + Sync>;

/// Callback for listener codes. Always suppresses normal delivery.
pub type ListenerCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// The default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The only HTTP status treated as acceptable unless configured otherwise.
pub const DEFAULT_SUCCESS_STATUS: u16 = 200;

/// A deployment environment, each with a fixed base URL.
///
/// ```
/// use conduit::Environment;
///
/// let env: Environment = "uat".parse().unwrap();
/// assert_eq!(env, Environment::Uat);
/// assert_eq!(env.base_url(), "https://uat-api.example.com");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Uat,
    Production,
}

impl Environment {
    /// Returns the base URL this environment points at.
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Development => "https://dev-api.example.com",
            Environment::Staging => "https://staging-api.example.com",
            Environment::Uat => "https://uat-api.example.com",
            Environment::Production => "https://api.example.com",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Uat => "uat",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "uat" => Ok(Environment::Uat),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(crate::Error::Configuration(format!(
                "Unknown environment: {}",
                other
            ))),
        }
    }
}

/// A non-destructive update: provided keys overwrite, everything else survives.
///
/// ```
/// use conduit::{Config, ConfigUpdate};
///
/// let config = Config::new();
/// config.update(
///     ConfigUpdate::new()
///         .header("Authorization", "Bearer X")
///         .parameter("locale", "en"),
/// );
/// assert_eq!(
///     config.snapshot().common_headers().get("Authorization").map(String::as_str),
///     Some("Bearer X")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    base_url: Option<Url>,
    headers: HashMap<String, String>,
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the base URL.
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets one common header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets several common headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets one common parameter.
    pub fn parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Sets several common parameters.
    pub fn parameters(
        mut self,
        parameters: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        self.parameters.extend(parameters);
        self
    }
}

/// A point-in-time copy of the configuration, taken when a call is built.
#[derive(Clone)]
pub struct ConfigSnapshot {
    pub(crate) base_url: Option<Url>,
    pub(crate) environment: Option<Environment>,
    pub(crate) common_headers: HashMap<String, String>,
    pub(crate) common_parameters: serde_json::Map<String, serde_json::Value>,
    pub(crate) timeout: Duration,
    pub(crate) success_status: u16,
    pub(crate) intercept_codes: HashSet<i64>,
    pub(crate) interceptor: Option<InterceptHandler>,
    pub(crate) listener_codes: HashSet<i64>,
    pub(crate) listener: Option<ListenerCallback>,
    pub(crate) debug_logging: bool,
}

impl ConfigSnapshot {
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn environment(&self) -> Option<Environment> {
        self.environment
    }

    pub fn common_headers(&self) -> &HashMap<String, String> {
        &self.common_headers
    }

    pub fn common_parameters(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.common_parameters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn success_status(&self) -> u16 {
        self.success_status
    }

    pub fn intercept_codes(&self) -> &HashSet<i64> {
        &self.intercept_codes
    }

    pub fn listener_codes(&self) -> &HashSet<i64> {
        &self.listener_codes
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            base_url: None,
            environment: None,
            common_headers: HashMap::new(),
            common_parameters: serde_json::Map::new(),
            timeout: DEFAULT_TIMEOUT,
            success_status: DEFAULT_SUCCESS_STATUS,
            intercept_codes: HashSet::new(),
            interceptor: None,
            listener_codes: HashSet::new(),
            listener: None,
            debug_logging: false,
        }
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("environment", &self.environment)
            .field("common_headers", &self.common_headers)
            .field("common_parameters", &self.common_parameters)
            .field("timeout", &self.timeout)
            .field("success_status", &self.success_status)
            .field("intercept_codes", &self.intercept_codes)
            .field("interceptor", &self.interceptor.is_some())
            .field("listener_codes", &self.listener_codes)
            .field("listener", &self.listener.is_some())
            .field("debug_logging", &self.debug_logging)
            .finish()
    }
}

/// Handle to the single shared configuration instance.
///
/// Clones share the same state. All reads and writes are serialized through
/// one lock; readers take a [`snapshot`](Config::snapshot).
#[derive(Clone, Default)]
pub struct Config {
    inner: Arc<RwLock<ConfigSnapshot>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Merges `update` into the configuration.
    pub fn update(&self, update: ConfigUpdate) {
        let mut state = self.inner.write();
        if let Some(url) = update.base_url {
            state.base_url = Some(url);
        }
        state.common_headers.extend(update.headers);
        state.common_parameters.extend(update.parameters);
    }

    /// Switches the environment and its base URL in one step.
    pub fn set_environment(&self, environment: Environment) {
        match Url::parse(environment.base_url()) {
            Ok(url) => {
                let mut state = self.inner.write();
                state.base_url = Some(url);
                state.environment = Some(environment);
            }
            Err(e) => {
                tracing::error!(environment = %environment, error = %e, "Invalid environment base URL");
            }
        }
    }

    pub fn environment(&self) -> Option<Environment> {
        self.inner.read().environment
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.write().timeout = timeout;
    }

    pub fn set_success_status(&self, status: u16) {
        self.inner.write().success_status = status;
    }

    pub fn set_debug_logging(&self, enabled: bool) {
        self.inner.write().debug_logging = enabled;
    }

    /// Replaces the intercept codes and their handler.
    ///
    /// Registration is wholesale: the previous set and handler are discarded.
    pub fn register_intercept_codes<F>(&self, codes: impl IntoIterator<Item = i64>, handler: F)
    where
        F: Fn(i64, &str, &serde_json::Value) -> bool + Send + Sync + 'static,
    {
        let codes: HashSet<i64> = codes.into_iter().collect();
        let mut state = self.inner.write();
        state.intercept_codes = codes;
        state.interceptor = Some(Arc::new(handler));
    }

    /// Replaces the listener codes and their callback.
    ///
    /// Registration is wholesale: the previous set and callback are discarded.
    pub fn register_listener_codes<F>(&self, codes: impl IntoIterator<Item = i64>, callback: F)
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        let codes: HashSet<i64> = codes.into_iter().collect();
        let mut state = self.inner.write();
        state.listener_codes = codes;
        state.listener = Some(Arc::new(callback));
    }

    /// Returns a copy of the current configuration.
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.inner.read().clone()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Config").field(&*self.inner.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_merges_without_dropping_keys() {
        let config = Config::new();
        config.update(
            ConfigUpdate::new()
                .header("A", "1")
                .header("B", "2")
                .parameter("p", 1),
        );
        config.update(ConfigUpdate::new().header("B", "3").parameter("q", "x"));

        let snapshot = config.snapshot();
        assert_eq!(snapshot.common_headers().get("A").unwrap(), "1");
        assert_eq!(snapshot.common_headers().get("B").unwrap(), "3");
        assert_eq!(snapshot.common_parameters().len(), 2);
        assert!(snapshot.base_url().is_none());
    }

    #[test]
    fn test_update_keeps_base_url_when_absent() {
        let config = Config::new();
        config.update(ConfigUpdate::new().base_url(Url::parse("https://a.example.com").unwrap()));
        config.update(ConfigUpdate::new().header("X", "y"));
        assert_eq!(
            config.snapshot().base_url().unwrap().as_str(),
            "https://a.example.com/"
        );
    }

    #[test]
    fn test_set_environment_rewrites_base_url() {
        let config = Config::new();
        config.set_environment(Environment::Staging);
        assert_eq!(config.environment(), Some(Environment::Staging));
        assert_eq!(
            config.snapshot().base_url().unwrap().host_str(),
            Some("staging-api.example.com")
        );

        config.set_environment(Environment::Production);
        assert_eq!(
            config.snapshot().base_url().unwrap().host_str(),
            Some("api.example.com")
        );
    }

    #[test]
    fn test_environment_urls_parse() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Uat,
            Environment::Production,
        ] {
            assert!(Url::parse(env.base_url()).is_ok(), "{}", env);
            assert_eq!(env.to_string().parse::<Environment>().unwrap(), env);
        }
        assert!("moon".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_serde_names() {
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Production);
        assert_eq!(serde_json::to_string(&Environment::Uat).unwrap(), "\"uat\"");
    }

    #[test]
    fn test_registration_replaces_previous() {
        let config = Config::new();
        config.register_intercept_codes([1, 2], |_, _, _| true);
        config.register_intercept_codes([3], |_, _, _| false);
        config.register_listener_codes([10, 11], |_| {});
        config.register_listener_codes([12], |_| {});

        let snapshot = config.snapshot();
        assert_eq!(snapshot.intercept_codes(), &HashSet::from([3]));
        assert_eq!(snapshot.listener_codes(), &HashSet::from([12]));
        let handler = snapshot.interceptor.clone().unwrap();
        assert!(!handler(3, "", &serde_json::Value::Null));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_updates() {
        let config = Config::new();
        config.update(ConfigUpdate::new().header("A", "1"));
        let before = config.snapshot();
        config.update(ConfigUpdate::new().header("A", "2"));
        assert_eq!(before.common_headers().get("A").unwrap(), "1");
        assert_eq!(config.snapshot().common_headers().get("A").unwrap(), "2");
    }

    #[test]
    fn test_defaults() {
        let snapshot = Config::new().snapshot();
        assert_eq!(snapshot.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(snapshot.success_status(), 200);
        assert!(!snapshot.debug_logging());
    }
}
