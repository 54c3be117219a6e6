use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::TokenEndpointConfig;
use crate::errors::{TokenError, TokenResult};

/// The token-issuing endpoint
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Raw token payload for a channel under one presentation context
    async fn fetch_token(&self, channel: &str, context: &str) -> TokenResult<Value>;
}

/// Signed playback token used to authorise a manifest URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackToken {
    pub signature: String,
    pub value: String,
}

impl PlaybackToken {
    /// Reads `data.streamPlaybackAccessToken`, also from a batched (array) response
    pub fn from_payload(payload: &Value) -> TokenResult<Self> {
        let token = match payload {
            Value::Array(items) => items.iter().find_map(access_token),
            other => access_token(other),
        }
        .ok_or(TokenError::MissingToken)?;

        serde_json::from_value(token.clone()).map_err(|e| TokenError::Decode {
            message: e.to_string(),
        })
    }
}

fn access_token(payload: &Value) -> Option<&Value> {
    payload
        .get("data")
        .and_then(|data| data.get("streamPlaybackAccessToken"))
        .filter(|token| token.is_object())
}

/// GraphQL persisted-query client for the playback access token operation
pub struct GqlTokenIssuer {
    client: Client,
    config: TokenEndpointConfig,
}

impl GqlTokenIssuer {
    pub fn new(client: Client, config: TokenEndpointConfig) -> Self {
        Self { client, config }
    }

    pub fn request_body(&self, channel: &str, context: &str) -> Value {
        json!({
            "operationName": self.config.operation_name,
            "variables": {
                "isLive": true,
                "login": channel,
                "isVod": false,
                "vodID": "",
                "playerType": context,
            },
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": self.config.persisted_query_hash,
                }
            }
        })
    }
}

#[async_trait]
impl TokenIssuer for GqlTokenIssuer {
    async fn fetch_token(&self, channel: &str, context: &str) -> TokenResult<Value> {
        debug!(target = "token_cache", channel, context, "requesting playback token");

        let response = self
            .client
            .post(&self.config.url)
            .header("Client-ID", &self.config.client_id)
            .json(&self.request_body(channel, context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Http {
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| TokenError::Decode {
            message: e.to_string(),
        })
    }
}
