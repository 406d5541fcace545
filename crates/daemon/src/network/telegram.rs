//! Telegram Bot API client.
//!
//! Thin reqwest wrapper for `getUpdates` and `sendMessage`. Every call is a
//! JSON `POST` to `{api_url}/bot{token}/{method}`; anything but a 200 with
//! `ok: true` is an error.

use std::time::Duration;

use protocol::{ApiResponse, GetUpdatesRequest, ProtocolError, SendMessageRequest, Update};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ChatTransport;
use crate::config::{redact_token, TelegramConfig};

/// Extra time on top of the long-poll timeout before the client gives up
/// on a `getUpdates` request.
pub const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client bound to one bot token.
pub struct TelegramClient {
    client: Client,
    base_url: String,
    bot_id: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("bot", &self.bot_id)
            .finish()
    }
}

impl TelegramClient {
    /// Creates a client for the Bot API at `api_url`.
    pub fn new(bot_token: &str, api_url: &str) -> Result<Self, ProtocolError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProtocolError::ConnectionFailed(e.without_url().to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            bot_id: redact_token(bot_token),
        })
    }

    /// Creates a client from the `[telegram]` configuration section.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ProtocolError> {
        Self::new(&config.bot_token, &config.api_url)
    }

    /// Calls a Bot API method and unwraps its `result`.
    async fn call<B, T>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, ProtocolError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(method, status = status.as_u16(), body = %body, "Bot API call rejected");
            return Err(ProtocolError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let api_response: ApiResponse<T> = serde_json::from_slice(&bytes)?;

        if !api_response.ok {
            return Err(ProtocolError::Api(
                api_response.description.unwrap_or_default(),
            ));
        }

        api_response
            .result
            .ok_or_else(|| ProtocolError::Deserialization(format!("{} returned no result", method)))
    }
}

impl ChatTransport for TelegramClient {
    async fn poll_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, ProtocolError> {
        let request = GetUpdatesRequest::new(offset, timeout);
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &request,
                Some(Duration::from_secs(timeout) + POLL_GRACE),
            )
            .await?;

        tracing::debug!(offset, count = updates.len(), "Received updates");
        Ok(updates)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ProtocolError> {
        let request = SendMessageRequest { chat_id, text };
        let _: serde_json::Value = self.call("sendMessage", &request, None).await?;

        tracing::trace!(chat_id, "Sent message");
        Ok(())
    }
}

/// Maps a reqwest error without leaking the token-bearing URL.
fn map_reqwest_error(err: reqwest::Error) -> ProtocolError {
    let err = err.without_url();
    if err.is_timeout() {
        ProtocolError::Timeout(err.to_string())
    } else if err.is_decode() {
        ProtocolError::Deserialization(err.to_string())
    } else {
        ProtocolError::ConnectionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:secret";

    async fn client_for(server: &MockServer) -> TelegramClient {
        TelegramClient::new(TOKEN, &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_poll_updates_sends_offset_and_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/getUpdates"))
            .and(body_json(json!({
                "offset": 17,
                "timeout": 0,
                "allowed_updates": ["message"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 17, "message": {"message_id": 1, "chat": {"id": 5}, "text": "$ ls"}},
                    {"update_id": 18, "message": {"message_id": 2, "chat": {"id": 6}, "text": "hi"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let updates = client_for(&server).await.poll_updates(17, 0).await.unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], Update::text_message(17, 5, "$ ls"));
        assert_eq!(updates[1].sender_id(), Some(6));
    }

    #[tokio::test]
    async fn test_poll_updates_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": []})),
            )
            .mount(&server)
            .await;

        let updates = client_for(&server).await.poll_updates(0, 0).await.unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .poll_updates(0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedStatus { status: 401 }));
    }

    #[tokio::test]
    async fn test_ok_false_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: message text is empty"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .send_message(1, "")
            .await
            .unwrap_err();
        match err {
            ProtocolError::Api(desc) => assert!(desc.contains("message text is empty")),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_deserialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .poll_updates(0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_send_message_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/sendMessage"))
            .and(body_json(json!({"chat_id": -42, "text": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 9, "chat": {"id": -42}, "text": "hi"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .send_message(-42, "hi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_hides_token() {
        // Nothing listens on port 9 of localhost.
        let client = TelegramClient::new(TOKEN, "http://127.0.0.1:9").unwrap();

        let err = client.poll_updates(0, 0).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionFailed(_)));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = TelegramClient::new(TOKEN, "https://api.telegram.org/").unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:secret");
    }
}
