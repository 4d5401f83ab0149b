//! Business-code interception.
//!
//! Successful HTTP responses carry an application-level `code`. Codes
//! registered as listener codes notify a global callback and end the call;
//! codes registered as intercept codes go to a handler that may end the call.
//! Listener membership is checked first, so a code in both sets only reaches
//! the listener.

use crate::{bridge::CallbackQueue, config::ConfigSnapshot};
use serde_json::Value;

/// Which registration ended the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptKind {
    Listener,
    Handler,
}

/// Details of a call that was withheld from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interception {
    pub code: i64,
    pub kind: InterceptKind,
}

/// Result of inspecting a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Deliver normally. `document` is `None` when the body is not JSON.
    PassThrough {
        document: Option<Value>,
        code: Option<i64>,
        message: Option<String>,
    },
    Intercepted(Interception),
    /// The HTTP status is not the configured success status.
    StatusError { status: u16, body: String },
}

/// Extracts the business code from a response document.
///
/// Accepts integers, integral floats and numeric strings.
///
/// ```
/// use conduit::intercept::business_code;
/// use serde_json::json;
///
/// assert_eq!(business_code(&json!({"code": 4001})), Some(4001));
/// assert_eq!(business_code(&json!({"code": " 200 "})), Some(200));
/// assert_eq!(business_code(&json!({"code": "ok"})), None);
/// ```
pub fn business_code(document: &Value) -> Option<i64> {
    match document.get("code")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extracts the business message, reading `message` and then `msg`.
pub fn business_message(document: &Value) -> Option<String> {
    ["message", "msg"]
        .iter()
        .find_map(|key| document.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Classifies a received response.
///
/// Listener callbacks are scheduled on `queue`. Intercept handlers run inline
/// because their answer decides the outcome.
pub fn classify(
    status: u16,
    body: &[u8],
    config: &ConfigSnapshot,
    queue: &CallbackQueue,
) -> Classification {
    if status != config.success_status {
        return Classification::StatusError {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        };
    }

    let document = serde_json::from_slice::<Value>(body).ok();
    let (code, message) = match document.as_ref().filter(|doc| doc.is_object()) {
        Some(doc) => (business_code(doc), business_message(doc)),
        None => (None, None),
    };

    if let (Some(code), Some(doc)) = (code, document.as_ref()) {
        if config.listener_codes.contains(&code) {
            if let Some(listener) = config.listener.clone() {
                tracing::debug!(code, "Listener code received, withholding response");
                queue.execute(move || listener(code));
                return Classification::Intercepted(Interception {
                    code,
                    kind: InterceptKind::Listener,
                });
            }
        }

        if config.intercept_codes.contains(&code) {
            if let Some(handler) = &config.interceptor {
                if handler(code, message.as_deref().unwrap_or_default(), doc) {
                    tracing::debug!(code, "Intercept handler consumed response");
                    return Classification::Intercepted(Interception {
                        code,
                        kind: InterceptKind::Handler,
                    });
                }
            }
        }
    }

    Classification::PassThrough {
        document,
        code,
        message,
    }
}
