//! Local HTTP helper server.
//!
//! Exposes `GET /api/proxy?url=...`, which fetches an arbitrary page and
//! returns `{"html": ...}`, and `GET /api/scrape`, which returns the scraped
//! top-anime list.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::providers::gojo::GojoScraper;

pub struct ProxyState {
    pub client: Client,
    pub scraper: GojoScraper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Proxy { target: Option<String> },
    Scrape,
    NotFound,
    MethodNotAllowed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json; charset=utf-8",
            body: value.to_string().into_bytes(),
        }
    }

    fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: message.as_bytes().to_vec(),
        }
    }
}

pub fn route(method: &str, target: &str) -> Route {
    if method != "GET" && method != "HEAD" {
        return Route::MethodNotAllowed;
    }
    let Ok(parsed) = Url::parse(&format!("http://localhost{target}")) else {
        return Route::NotFound;
    };
    match parsed.path() {
        "/api/proxy" => Route::Proxy {
            target: parsed
                .query_pairs()
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty()),
        },
        "/api/scrape" => Route::Scrape,
        _ => Route::NotFound,
    }
}

pub async fn serve(bind: &str, state: ProxyState) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind helper server on {bind}"))?;
    let addr = listener
        .local_addr()
        .context("failed to read helper server address")?;
    println!("Serving /api/proxy and /api/scrape on http://{addr}");
    info!(%addr, "helper server listening");
    serve_listener(listener, Arc::new(state)).await
}

pub async fn serve_listener(listener: TcpListener, state: Arc<ProxyState>) -> Result<()> {
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "helper server accept failed");
                continue;
            }
        };
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&mut stream, &state).await {
                if is_benign_proxy_error(&err) {
                    return;
                }
                error!(%peer, error = %err, "helper server request failed");
                let response = Response::text(500, "proxy error");
                if let Err(write_err) = write_response(&mut stream, &response, false).await {
                    if !is_benign_proxy_error(&write_err) {
                        warn!(error = %write_err, "failed to write error response");
                    }
                }
            }
        });
    }
}

async fn handle_connection(stream: &mut TcpStream, state: &ProxyState) -> Result<()> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut *stream);
        let bytes_read = reader
            .read_line(&mut request_line)
            .await
            .context("failed to read request")?;
        if bytes_read == 0 {
            return Ok(());
        }
        // Drain headers; the routes only look at the request line.
        loop {
            let mut line = String::new();
            let n = reader
                .read_line(&mut line)
                .await
                .context("failed to read request headers")?;
            if n == 0 || line == "\r\n" || line == "\n" {
                break;
            }
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    debug!(%method, %target, "helper request");

    let response = respond(route(&method, &target), state).await;
    write_response(stream, &response, method == "HEAD").await
}

pub async fn respond(route: Route, state: &ProxyState) -> Response {
    match route {
        Route::MethodNotAllowed => Response::text(405, "method not allowed"),
        Route::NotFound => Response::text(404, "not found"),
        Route::Proxy { target: None } => {
            Response::json(400, json!({ "error": "URL parameter is required" }))
        }
        Route::Proxy {
            target: Some(target),
        } => proxy_page(&state.client, &target).await,
        Route::Scrape => match state.scraper.scrape_top().await {
            Ok(items) => Response::json(200, json!(items)),
            Err(err) => {
                error!(error = %err, "error fetching top anime");
                Response::json(500, json!({ "message": "Error fetching top anime" }))
            }
        },
    }
}

async fn proxy_page(client: &Client, target: &str) -> Response {
    let response = match client.get(target).send().await {
        Ok(response) => response,
        Err(err) => {
            error!(%target, error = %err, "error fetching the URL");
            return Response::json(500, json!({ "error": "Failed to fetch the URL" }));
        }
    };
    let status = response.status();
    if !status.is_success() {
        return Response::json(
            status.as_u16(),
            json!({ "error": "Failed to fetch the requested URL" }),
        );
    }
    match response.text().await {
        Ok(html) => Response::json(200, json!({ "html": html })),
        Err(err) => {
            error!(%target, error = %err, "error reading the URL body");
            Response::json(500, json!({ "error": "Failed to fetch the URL" }))
        }
    }
}

pub async fn write_response(
    stream: &mut TcpStream,
    response: &Response,
    head_only: bool,
) -> Result<()> {
    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.body.len(),
        response.content_type
    );
    if let Err(err) = stream.write_all(header.as_bytes()).await {
        if is_benign_disconnect(&err) {
            return Ok(());
        }
        return Err(err).context("failed to write response headers");
    }
    if !head_only {
        if let Err(err) = stream.write_all(&response.body).await {
            if is_benign_disconnect(&err) {
                return Ok(());
            }
            return Err(err).context("failed to write response body");
        }
    }
    let _ = stream.shutdown().await;
    Ok(())
}

pub fn is_benign_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
    )
}

pub fn is_benign_proxy_error(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(is_benign_disconnect)
}
