use crate::error::{KasaiError, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct AppAccessToken {
    pub token: String,
    pub expires_at: Instant,
}

impl AppAccessToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Client-credentials grant against the Twitch OAuth token endpoint.
pub async fn fetch_app_access_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<AppAccessToken> {
    tracing::debug!(url = %token_url, "Fetching app access token");
    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", "client_credentials"),
    ];
    let response = http.post(token_url).form(&params).send().await?;

    if response.status().is_success() {
        let token_data = response.json::<TokenResponse>().await?;

        // Treat the token as expiring slightly early to absorb clock skew.
        let effective_expires_in = token_data.expires_in.saturating_sub(10);
        if effective_expires_in == 0 {
            tracing::warn!(
                expires_in = token_data.expires_in,
                "App access token expires almost immediately"
            );
        }

        let expires_at = Instant::now() + Duration::from_secs(effective_expires_in);
        tracing::info!(
            expires_in = token_data.expires_in,
            "App access token fetched"
        );
        Ok(AppAccessToken {
            token: token_data.access_token,
            expires_at,
        })
    } else {
        let status = response.status();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error body".to_string());
        tracing::error!(
            status = %status,
            body = %error_body,
            "Failed to get app access token"
        );
        Err(KasaiError::RequestFailed {
            code: status.as_u16(),
            message: super::helix::error_message(&error_body),
        })
    }
}
