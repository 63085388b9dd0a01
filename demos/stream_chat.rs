//! Streaming chat from the command line.
//!
//! Run with:
//! ```bash
//! export CHATSTREAM_BASE_URL="http://localhost:8000"
//! RUST_LOG=chatstream=debug cargo run --example stream_chat -- "rust async streams"
//! ```
//!
//! Press Ctrl-C to cancel the response mid-stream.

use std::io::Write;

use chatstream::{ChatClient, ChatRequest, ClientOptions, StreamEvent, Thread};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let query = if query.is_empty() {
        "latest Rust release".to_string()
    } else {
        query
    };

    let client = ChatClient::new(ClientOptions::from_env())?;
    let request = ChatRequest::search(query.clone()).with_max_results(5);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut thread = Thread::new();
    thread.push_user(query);
    thread.begin_assistant();

    print!("Response: ");
    let result = client
        .chat_stream(&request, cancel, |event| {
            if let StreamEvent::Token(text) = &event {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            thread.apply(event);
        })
        .await;
    println!();

    match result {
        Ok(summary) => println!("\n[{} event(s), {} fault(s)]", summary.events, summary.faults),
        Err(e) if e.is_cancelled() => {
            thread.interrupt();
            println!("\n[cancelled]");
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(response) = thread.last().and_then(|m| m.response.as_ref()) {
        for (i, result) in response.search_results().enumerate() {
            println!("{}. {} <{}>", i + 1, result.title, result.href);
            println!("   {}", result.body);
        }
        if let Some(content) = &response.url_content {
            println!("{} ({})", content.url, content.status_code);
        }
    }

    Ok(())
}
