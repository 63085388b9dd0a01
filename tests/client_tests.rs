use std::time::Duration;

use chatstream::{
    ChatClient, ChatRequest, ClientError, ClientOptions, ReaderError, StreamEvent, Thread, Tool,
};
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Reply {
    status: &'static str,
    content_type: &'static str,
    chunks: Vec<&'static str>,
    hold_open: bool,
}

impl Reply {
    fn events(chunks: Vec<&'static str>) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/event-stream",
            chunks,
            hold_open: false,
        }
    }

    fn json(status: &'static str, body: &'static str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body],
            hold_open: false,
        }
    }
}

/// Serve a single connection and return the raw request it carried.
async fn serve_once(reply: Reply) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
            reply.status, reply.content_type
        );
        let _ = socket.write_all(head.as_bytes()).await;
        for chunk in reply.chunks {
            let _ = socket.write_all(chunk.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        if reply.hold_open {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let _ = socket.shutdown().await;
        request
    });

    (base_url, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn client(base_url: &str) -> ChatClient {
    ChatClient::new(ClientOptions::new(base_url).with_timeout(Duration::from_secs(10))).unwrap()
}

#[tokio::test]
async fn chat_stream_merges_into_thread() {
    let (base_url, server) = serve_once(Reply::events(vec![
        "data: {\"type\":\"token\",\"value\":\"duckduckgo_search \"}\n",
        "\ndata: {\"type\":\"token\",\"value\":\"found 1\"}\n\n",
        "data: {\"type\":\"message\",\"value\":{\"reply\":\"duckduckgo_search found 1 result(s)\",",
        "\"used_tool\":true,\"tool\":\"duckduckgo_search\",\
         \"results\":[{\"title\":\"Rust\",\"href\":\"https://www.rust-lang.org\",\"body\":\"\"}]}}\n\n",
    ]))
    .await;

    let request = ChatRequest::search("rust").with_max_results(1);
    let mut thread = Thread::new();
    thread.push_user(request.message.clone());
    thread.begin_assistant();

    let summary = client(&base_url)
        .chat_stream(&request, CancellationToken::new(), |event| {
            thread.apply(event);
        })
        .await
        .unwrap();

    assert_eq!(summary.events, 3);
    assert_eq!(summary.faults, 0);

    let last = thread.last().unwrap();
    assert_eq!(last.text, "duckduckgo_search found 1");
    let response = last.response.as_ref().unwrap();
    assert_eq!(response.known_tool(), Some(Tool::DuckduckgoSearch));
    assert_eq!(response.result_count(), 1);

    let raw = server.await.unwrap();
    let lowered = raw.to_lowercase();
    assert!(raw.starts_with("POST /chat/stream HTTP/1.1"));
    assert!(lowered.contains("accept: text/event-stream"));
    assert!(raw.contains("\"tool\":\"duckduckgo_search\""));
    assert!(raw.contains("\"max_results\":1"));
}

#[tokio::test]
async fn chat_stream_cancelled_mid_stream() {
    let (base_url, _server) = serve_once(Reply {
        hold_open: true,
        ..Reply::events(vec!["data: {\"type\":\"token\",\"value\":\"partial\"}\n\n"])
    })
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut tokens = Vec::new();

    let err = client(&base_url)
        .chat_stream(&ChatRequest::new("hi"), cancel, |event| {
            if let StreamEvent::Token(text) = event {
                tokens.push(text);
                trigger.cancel();
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(matches!(err, ClientError::Stream(ReaderError::Cancelled { delivered: 1 })));
    assert_eq!(tokens, vec!["partial"]);
}

#[tokio::test]
async fn chat_events_yields_typed_stream() {
    let (base_url, _server) = serve_once(Reply::events(vec![
        "data: {\"type\":\"token\",\"value\":\"No tool\"}\n\n",
        "data: {\"type\":\"message\",\"value\":{\"reply\":\"No tool requested.\",\"used_tool\":false}}\n\n",
    ]))
    .await;

    let events: Vec<_> = client(&base_url)
        .chat_events(&ChatRequest::new("hello"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Ok(StreamEvent::Token(t)) if t == "No tool"));
    match &events[1] {
        Ok(StreamEvent::Message(response)) => {
            assert_eq!(response.reply, "No tool requested.");
            assert!(!response.used_tool);
            assert!(response.results.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn chat_returns_full_response() {
    let (base_url, server) = serve_once(Reply::json(
        "200 OK",
        r#"{"reply":"Fetched and parsed https://example.com/","used_tool":true,"tool":"fetch_url","results":null,"url_content":{"url":"https://example.com/","status_code":200,"content_type":"text/html","title":"Example Domain","description":null,"headings":["Example Domain"],"preview":"This domain is for use in examples."}}"#,
    ))
    .await;

    let response = client(&base_url)
        .chat(&ChatRequest::fetch("read it", "https://example.com"))
        .await
        .unwrap();

    let content = response.url_content.unwrap();
    assert_eq!(content.title.as_deref(), Some("Example Domain"));
    assert_eq!(content.headings.unwrap().head, "Example Domain");

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /chat HTTP/1.1"));
    assert!(raw.contains("\"url\":\"https://example.com\""));
}

#[tokio::test]
async fn service_error_detail_is_surfaced() {
    let (base_url, _server) = serve_once(Reply::json(
        "502 Bad Gateway",
        r#"{"detail":"URL fetch failed: timed out"}"#,
    ))
    .await;

    let err = client(&base_url)
        .chat_stream(
            &ChatRequest::fetch("read", "https://example.com"),
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

    match err {
        ClientError::Service { status, detail } => {
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(detail, "URL fetch failed: timed out");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn hello_encodes_input() {
    let (base_url, server) =
        serve_once(Reply::json("200 OK", r#"{"message":"Hello, World big world"}"#)).await;

    let message = client(&base_url).hello("big world").await.unwrap();
    assert_eq!(message, "Hello, World big world");

    let raw = server.await.unwrap();
    assert!(raw.starts_with("GET /hello/big%20world HTTP/1.1"));
}

#[tokio::test]
async fn invalid_request_is_rejected_locally() {
    // Nothing listens here; validation must fail before any connection.
    let client = client("http://127.0.0.1:9");

    let err = client
        .chat_stream(
            &ChatRequest::new("page").with_tool(Tool::FetchUrl),
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Invalid(_)));
}

#[tokio::test]
async fn chat_stream_accepts_partial_and_unknown_tool_messages() {
    let (base_url, _server) = serve_once(Reply::events(vec![
        "data: {\"type\":\"message\",\"value\":{\"results\":[]}}\n\n",
        "data: {\"type\":\"message\",\"value\":{\"reply\":\"x\",\"used_tool\":true,\"tool\":\"newsletter\"}}\n\n",
    ]))
    .await;

    let mut messages = Vec::new();
    let summary = client(&base_url)
        .chat_stream(&ChatRequest::new("news"), CancellationToken::new(), |event| {
            messages.extend(event.into_message());
        })
        .await
        .unwrap();

    assert_eq!(summary.events, 2);
    assert_eq!(summary.faults, 0);

    assert_eq!(messages[0].reply, "");
    assert!(messages[0].results.is_none());
    assert_eq!(messages[1].tool.as_deref(), Some("newsletter"));
    assert_eq!(messages[1].known_tool(), None);
}
