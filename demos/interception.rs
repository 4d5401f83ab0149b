//! Business-code interception against a local mock server.
//!
//! Shows a listener that handles "session expired" for every call, an
//! intercept handler that decides per response, and how the caller observes
//! each case.
//!
//! Run with: `cargo run --example interception`

use conduit::{Client, Error, Outcome, Target, TracingSink};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit=info,interception=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let server = MockServer::start().await;
    for (route, body) in [
        ("/profile", json!({"code": 4001, "message": "session expired"})),
        ("/notice", json!({"code": 3001, "message": "maintenance tonight"})),
        ("/feed", json!({"code": 0, "message": "ok", "data": [1, 2, 3]})),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let client = Client::builder()
        .base_url(server.uri())?
        .debug_logging(true)
        .log_sink(TracingSink)
        .build()?;

    client.config().register_listener_codes([4001], |code| {
        println!("listener: code {}, sending the user to login", code);
    });
    client
        .config()
        .register_intercept_codes([3001], |code, message, _| {
            println!("handler: code {} says '{}'", code, message);
            true
        });

    for route in ["/profile", "/notice", "/feed"] {
        match client.request_json(Target::get(route), Some("data")).await {
            Outcome::Success(response) => println!("{} -> data {}", route, response.data),
            Outcome::Failure(e) => println!("{} -> failed: {}", route, e),
            Outcome::Intercepted(i) => println!("{} -> withheld ({:?}, {})", route, i.kind, i.code),
        }
    }

    Ok(())
}
