//! Basic example demonstrating await-style and callback-style calls.
//!
//! This example shows how to:
//! - Create a client with shared headers and parameters
//! - Decode an object and an array from responses
//! - Deliver callbacks on an application-owned main queue
//! - Access response data and metadata
//!
//! Run with: `cargo run --example basic_call`

use conduit::{CallbackQueue, Client, Error, Outcome, Target};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit=debug,basic_call=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let (queue, mut main_queue) = CallbackQueue::main();
    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .default_header("Accept", "application/json")?
        .timeout(Duration::from_secs(10))
        .debug_logging(true)
        .callback_queue(queue)
        .build()?;

    println!("=== Object ===");
    match client
        .request_object(Target::get("/posts/1"), None, Post::default())
        .await
    {
        Outcome::Success(post) => {
            println!("Post ID: {}", post.data.id);
            println!("Title: {}", post.data.title);
            println!("Status: {}", post.status);
            println!("Latency: {:?}", post.latency);
        }
        Outcome::Failure(e) => eprintln!("Request failed: {}", e),
        Outcome::Intercepted(i) => eprintln!("Intercepted with code {}", i.code),
    }

    println!("\n=== Array ===");
    let posts = client
        .request_array::<Post>(Target::get("/posts").with_parameter("userId", 1), None)
        .await;
    if let Some(response) = posts.success() {
        println!("User 1 wrote {} posts", response.data.len());
    }

    println!("\n=== Callback on the main queue ===");
    client.request_object_with(
        Target::get("/posts/2"),
        None,
        Post::default(),
        None,
        |post| println!("Callback got post {}: {}", post.data.id, post.data.title),
        |e| eprintln!("Callback got error: {}", e),
    );
    main_queue.run_one().await;

    Ok(())
}
