//! Forwarding inbound events to the automation engine.
//!
//! The webhook response never waits on the engine: submission spawns a
//! background task. Failures are retried a bounded number of times and the
//! final failure is logged with enough context (conversation id, channel)
//! to replay or alert on — never silently dropped.

use std::time::Duration;

use {
    serde::Serialize,
    tokio::task::JoinHandle,
    tracing::{debug, error, warn},
};

use courier_common::SenderProfile;

/// Path suffix appended to the configured automation base URL.
const CHAT_MESSAGE_PATH: &str = "/chat-message";

/// Payload posted to the automation engine for each forwarded event.
#[derive(Debug, Clone, Serialize)]
pub struct ForwardPayload {
    pub bot_id: String,
    pub channel_id: String,
    pub conversation_id: String,
    pub channel_type: String,
    pub external_thread_id: String,
    pub text: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<serde_json::Value>,
    pub sender: SenderProfile,
    pub raw: serde_json::Value,
}

/// Background submitter with bounded retry.
pub struct Forwarder {
    http: reqwest::Client,
    default_base: Option<String>,
    attempts: u32,
    retry_delay: Duration,
}

impl Forwarder {
    #[must_use]
    pub fn new(default_base: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            default_base,
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Shrink the retry schedule (tests).
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Submit a payload as a background task. `base_override` comes from the
    /// channel's bot; the configured default applies otherwise. Returns the
    /// task handle so tests can await completion.
    pub fn submit(
        &self,
        base_override: Option<String>,
        payload: ForwardPayload,
    ) -> Option<JoinHandle<()>> {
        let Some(base) = base_override.or_else(|| self.default_base.clone()) else {
            warn!(
                conversation_id = %payload.conversation_id,
                channel_type = %payload.channel_type,
                "no automation webhook base configured, dropping forward"
            );
            return None;
        };
        let url = format!("{}{CHAT_MESSAGE_PATH}", base.trim_end_matches('/'));

        let http = self.http.clone();
        let attempts = self.attempts;
        let retry_delay = self.retry_delay;

        Some(tokio::spawn(async move {
            for attempt in 1..=attempts {
                match http.post(&url).json(&payload).send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(
                            conversation_id = %payload.conversation_id,
                            attempt,
                            "forwarded to automation engine"
                        );
                        return;
                    },
                    Ok(response) => warn!(
                        conversation_id = %payload.conversation_id,
                        status = %response.status(),
                        attempt,
                        "automation engine answered non-success"
                    ),
                    Err(e) => warn!(
                        conversation_id = %payload.conversation_id,
                        error = %e,
                        attempt,
                        "automation forward attempt failed"
                    ),
                }
                if attempt < attempts {
                    tokio::time::sleep(retry_delay * attempt).await;
                }
            }
            error!(
                conversation_id = %payload.conversation_id,
                channel_type = %payload.channel_type,
                %url,
                "automation forward failed after all attempts"
            );
        }))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ForwardPayload {
        ForwardPayload {
            bot_id: "bot-1".into(),
            channel_id: "ch-1".into(),
            conversation_id: "conv-1".into(),
            channel_type: "telegram".into(),
            external_thread_id: "42".into(),
            text: "halo".into(),
            message_type: "text".into(),
            media: None,
            sender: SenderProfile::default(),
            raw: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn delivers_to_chat_message_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat-message")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"conversation_id":"conv-1","text":"halo"}"#.to_string(),
            ))
            .create_async()
            .await;

        let forwarder = Forwarder::new(Some(server.url()));
        forwarder.submit(None, payload()).unwrap().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failing_engine_is_retried_each_attempt() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/chat-message")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let forwarder =
            Forwarder::new(Some(server.url())).with_retry(3, Duration::from_millis(10));
        forwarder.submit(None, payload()).unwrap().await.unwrap();

        failing.assert_async().await;
    }

    #[tokio::test]
    async fn channel_override_wins_over_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/chat-message").create_async().await;

        let forwarder = Forwarder::new(Some("http://unreachable.invalid".into()))
            .with_retry(1, Duration::from_millis(1));
        forwarder
            .submit(Some(server.url()), payload())
            .unwrap()
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_base_is_not_submitted() {
        let forwarder = Forwarder::new(None);
        assert!(forwarder.submit(None, payload()).is_none());
    }
}
