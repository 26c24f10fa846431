//! Slack alert forwarding
//!
//! Posts rendered reports to a channel through `chat.postMessage`. The bot
//! token is read from `SLACK_API_TOKEN`.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::lens::compliance::AlertLevel;

pub const SLACK_TOKEN_ENV: &str = "SLACK_API_TOKEN";
const SLACK_API_URL: &str = "https://slack.com/api";

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

pub struct SlackNotifier {
    token: String,
    api_url: String,
    agent: ureq::Agent,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build()
            .into();
        Self {
            token: token.into(),
            api_url: SLACK_API_URL.to_string(),
            agent,
        }
    }

    /// Build from `SLACK_API_TOKEN`
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(SLACK_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("the '{}' environment variable must be set", SLACK_TOKEN_ENV))?;
        Ok(Self::new(token))
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Whether a report at `level` should be posted
    pub fn should_post(level: AlertLevel, alerts_only: bool) -> bool {
        !alerts_only || level != AlertLevel::Ok
    }

    /// Post `text` to `channel`, returning the message timestamp
    pub fn post(&self, channel: &str, text: &str) -> Result<String> {
        let url = format!("{}/chat.postMessage", self.api_url.trim_end_matches('/'));
        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", self.token))
            .send_json(serde_json::json!({
                "channel": channel,
                "text": text,
            }))
            .map_err(|e| anyhow!("failed to post to Slack channel {}: {}", channel, e))?;

        let reply: SlackResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| anyhow!("unexpected reply from Slack: {}", e))?;

        if !reply.ok {
            return Err(anyhow!(
                "Slack rejected the message for channel {}: {}",
                channel,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        info!("posted report to Slack channel {}", channel);
        Ok(reply.ts.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer one HTTP request with `body`, returning the request head and payload
    fn serve_once(body: &'static str) -> (String, thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            (head, String::from_utf8(payload).unwrap())
        });
        (url, handle)
    }

    #[test]
    fn test_post_message() {
        let (url, server) = serve_once(r#"{"ok":true,"ts":"1700000000.000100"}"#);
        let slack = SlackNotifier::new("xoxb-test").with_api_url(url);

        let ts = slack.post("#noc", "[OK] No alerts!").unwrap();
        assert_eq!(ts, "1700000000.000100");

        let (head, payload) = server.join().unwrap();
        assert!(head.starts_with("POST /api/chat.postMessage"));
        assert!(head.contains("Bearer xoxb-test"));

        let body: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(body["channel"], "#noc");
        assert_eq!(body["text"], "[OK] No alerts!");
    }

    #[test]
    fn test_post_rejected() {
        let (url, server) = serve_once(r#"{"ok":false,"error":"channel_not_found"}"#);
        let slack = SlackNotifier::new("xoxb-test").with_api_url(url);

        let err = slack.post("#nope", "text").unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
        server.join().unwrap();
    }

    #[test]
    fn test_should_post() {
        assert!(SlackNotifier::should_post(AlertLevel::Ok, false));
        assert!(!SlackNotifier::should_post(AlertLevel::Ok, true));
        assert!(SlackNotifier::should_post(AlertLevel::Warning, true));
        assert!(SlackNotifier::should_post(AlertLevel::Critical, true));
    }
}
