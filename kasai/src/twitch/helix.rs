use super::auth::AppAccessToken;
use crate::error::{KasaiError, Result};
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Instant;
use uuid::Uuid;

/// An open Helix API session: an HTTP client plus, once authorised, the app
/// access token used for every request.
#[derive(Debug, Clone)]
pub struct HelixSession {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    token: Option<AppAccessToken>,
}

impl HelixSession {
    pub fn new(http: reqwest::Client, base_url: &str, client_id: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            token: None,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn is_authorised(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the held token has run out. A session without a token has
    /// nothing to renew.
    pub fn token_expired(&self) -> bool {
        self.token.as_ref().is_some_and(AppAccessToken::is_expired)
    }

    pub fn authorise(&mut self, token: AppAccessToken) {
        self.token = Some(token);
    }

    /// Sends one request and returns the `data` array of the response, or the
    /// whole body as a single element when there is no `data` key.
    pub async fn request(
        &self,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Vec<Value>> {
        let token = self.token.as_ref().ok_or_else(|| {
            KasaiError::NotAlive("the Helix session has no access token yet".to_string())
        })?;

        let url = format!("{}/{}", self.base_url, route.trim_start_matches('/'));
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::trace!(
            request.id = %request_id,
            method = %method,
            url = %url,
            query = ?query,
            client_id = %self.client_id,
            authorization = "**REDACTED TOKEN**",
            body = ?body,
            "Helix request"
        );

        let mut builder = self
            .http
            .request(method, &url)
            .query(query)
            .bearer_auth(&token.token)
            .header("Client-Id", &self.client_id);
        if let Some(data) = body {
            builder = builder.json(&json!({ "data": data }));
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        tracing::trace!(
            request.id = %request_id,
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            body = %text,
            "Helix response"
        );

        if !status.is_success() {
            let code = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("status").and_then(Value::as_u64))
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or_else(|| status.as_u16());
            return Err(KasaiError::RequestFailed {
                code,
                message: error_message(&text),
            });
        }

        unwrap_data(serde_json::from_str(&text)?)
    }
}

fn unwrap_data(res: Value) -> Result<Vec<Value>> {
    match res {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(KasaiError::Deserialize(format!(
                "expected 'data' to be an array, got {other}"
            ))),
            None => Ok(vec![Value::Object(map)]),
        },
        other => Ok(vec![other]),
    }
}

/// Pulls the `message` field out of a Twitch error body, falling back to the
/// raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_data_array() {
        let items = unwrap_data(json!({ "data": [{ "id": "1" }, { "id": "2" }] })).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], "2");
    }

    #[test]
    fn body_without_data_is_single_element() {
        let items = unwrap_data(json!({ "access_token": "abc", "expires_in": 10 })).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["access_token"], "abc");
    }

    #[test]
    fn error_message_prefers_json_message() {
        let body = r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#;
        assert_eq!(error_message(body), "Invalid OAuth token");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn reports_expired_token() {
        let mut session = HelixSession::new(reqwest::Client::new(), "http://127.0.0.1:9/helix", "id");
        assert!(!session.token_expired());

        session.authorise(AppAccessToken {
            token: "fresh".to_string(),
            expires_at: Instant::now() + std::time::Duration::from_secs(60),
        });
        assert!(session.is_authorised());
        assert!(!session.token_expired());

        session.authorise(AppAccessToken {
            token: "stale".to_string(),
            expires_at: Instant::now(),
        });
        assert!(session.token_expired());
    }

    #[tokio::test]
    async fn request_without_token_is_rejected() {
        let session = HelixSession::new(reqwest::Client::new(), "http://127.0.0.1:9/helix/", "id");
        assert!(!session.is_authorised());
        let err = session
            .request(Method::GET, "users", &[("login", "twitchdev")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, KasaiError::NotAlive(_)));
    }
}
