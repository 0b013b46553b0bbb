//! HTTP retrieval source.
//!
//! Talks to a retrieval service that wraps the archive's browser session.
//! The query is POSTed as JSON and the service answers with an NDJSON
//! stream of events, one object per line.

use crate::source::{parse_event_line, EventStream, RetrievalQuery, RetrievalSource, SourceEvent};
use anyhow::{Context, Result};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Explicit settings for the retrieval service connection.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Base URL of the retrieval service.
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Optional proxy for all requests.
    pub proxy: Option<String>,
    pub user_agent: String,
    /// Browser options forwarded to the service with every query.
    pub browser: BrowserOptions,
}

/// Browser launch options the service applies on our behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    #[serde(flatten)]
    query: &'a RetrievalQuery,
    browser: &'a BrowserOptions,
}

/// Retrieval source backed by the HTTP service.
pub struct HttpSource {
    config: HttpSourceConfig,
    http_client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        info!("Using retrieval service at {}", config.endpoint);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone());

        if let Some(ref proxy) = config.proxy {
            debug!("Routing retrieval requests through proxy {}", proxy);
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy URL: {}", proxy))?);
        }

        let http_client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn retrieve_url(&self) -> String {
        format!("{}/retrieve", self.config.endpoint.trim_end_matches('/'))
    }
}

impl RetrievalSource for HttpSource {
    fn retrieve(&self, query: RetrievalQuery) -> EventStream {
        let (tx, rx) = mpsc::unbounded();
        let client = self.http_client.clone();
        let url = self.retrieve_url();
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(message) = stream_events(&client, &url, &config, &query, &tx).await {
                let _ = tx.unbounded_send(SourceEvent::error(message));
            }
        });

        rx.boxed()
    }
}

/// Forward events from the response body until a terminal event arrives.
///
/// Transport failures come back as `Err` so the caller can turn them into
/// a terminal error event.
async fn stream_events(
    client: &reqwest::Client,
    url: &str,
    config: &HttpSourceConfig,
    query: &RetrievalQuery,
    tx: &UnboundedSender<SourceEvent>,
) -> std::result::Result<(), String> {
    let request = RetrieveRequest {
        query,
        browser: &config.browser,
    };

    let mut response = client.post(url).json(&request).send().await.map_err(|e| {
        if e.is_timeout() {
            format!("Request timed out after {}s", config.timeout_seconds)
        } else if e.is_connect() {
            format!("Cannot connect to retrieval service at {}", config.endpoint)
        } else {
            format!("Failed to send request: {}", e)
        }
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("Retrieval service error {}: {}", status, body));
    }

    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let bytes = match response.chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) if e.is_timeout() => {
                return Err(format!(
                    "Stream timed out after {}s",
                    config.timeout_seconds
                ))
            }
            Err(e) => return Err(format!("Stream interrupted: {}", e)),
        };

        buffer.extend_from_slice(&bytes);
        for line in drain_lines(&mut buffer) {
            if forward_line(&line, tx) {
                return Ok(());
            }
        }
    }

    // Service closed the body without a trailing newline
    let tail = String::from_utf8_lossy(&buffer).to_string();
    forward_line(&tail, tx);

    Ok(())
}

/// Send one line's event downstream. Returns true when the stream should stop.
fn forward_line(line: &str, tx: &UnboundedSender<SourceEvent>) -> bool {
    match parse_event_line(line) {
        Some(Ok(event)) => {
            let terminal = event.is_terminal();
            tx.unbounded_send(event).is_err() || terminal
        }
        Some(Err(e)) => {
            warn!("Skipping unparsable event line: {}", e);
            false
        }
        None => false,
    }
}

/// Remove every complete line from the buffer, leaving any partial tail.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line[..pos]).to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"{\"type\":\"complete\"}\n{\"type\":\"prog".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec![r#"{"type":"complete"}"#.to_string()]);
        assert_eq!(buffer, b"{\"type\":\"prog".to_vec());

        buffer.extend_from_slice(b"ress\",\"current\":1,\"total\":2}\r\n");
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert!(buffer.is_empty());
        assert!(parse_event_line(&lines[0]).unwrap().is_ok());
    }

    #[test]
    fn test_forward_line_stops_on_terminal() {
        let (tx, rx) = mpsc::unbounded();
        assert!(!forward_line(r#"{"type":"record","title":"A"}"#, &tx));
        assert!(!forward_line("garbage", &tx));
        assert!(forward_line(r#"{"type":"error","message":"blocked"}"#, &tx));

        drop(tx);
        let events: Vec<SourceEvent> = tokio_test::block_on(rx.collect());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SourceEvent::error("blocked"));
    }

    #[test]
    fn test_request_body_shape() {
        let query = RetrievalQuery {
            keyword: "rancho".to_string(),
            limit: 1000,
            date_range: [1870, 1870],
            start_date: chrono::NaiveDate::from_ymd_opt(1870, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(1870, 3, 31).unwrap(),
            location: "us-ca".to_string(),
        };
        let browser = BrowserOptions {
            executable_path: Some("/usr/bin/google-chrome".to_string()),
            ..BrowserOptions::default()
        };

        let body = serde_json::to_value(RetrieveRequest {
            query: &query,
            browser: &browser,
        })
        .unwrap();

        assert_eq!(body["keyword"], "rancho");
        assert_eq!(body["startDate"], "1870-01-01");
        assert_eq!(body["browser"]["headless"], true);
        assert_eq!(body["browser"]["executable_path"], "/usr/bin/google-chrome");
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let config = HttpSourceConfig {
            endpoint: "http://localhost:3000".to_string(),
            timeout_seconds: 5,
            proxy: Some("not a url".to_string()),
            user_agent: "paperchase-test".to_string(),
            browser: BrowserOptions::default(),
        };
        assert!(HttpSource::new(config).is_err());
    }
}
