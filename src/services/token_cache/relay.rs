//! Token request relay
//!
//! Request/response middleware for the token-issuing endpoint. A lone token
//! request is answered from the cache with the sanitized payload. A batch that
//! contains one is forwarded, and the response comes back sanitized in its
//! original array shape, with the token element stored in the cache. Everything
//! else is forwarded upstream untouched.

use bytes::Bytes;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::TokenEndpointConfig;
use crate::config::defaults::DEFAULT_TOKEN_OPERATION;
use crate::errors::{AppError, AppResult};

use super::{TokenCache, TokenKey};

/// Presentation context assumed when a token request does not name one
pub const DEFAULT_CONTEXT: &str = "site";

/// A recognised token request. `batch_index` is its position when the body is an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub key: TokenKey,
    pub batch_index: Option<usize>,
}

/// Cache key of a playback-token request body, if it is one
pub fn cache_key_for_request(body: &str) -> Option<TokenKey> {
    cache_key_for_operation(body, DEFAULT_TOKEN_OPERATION)
}

pub fn cache_key_for_operation(body: &str, operation_name: &str) -> Option<TokenKey> {
    token_request(body, operation_name).map(|request| request.key)
}

pub fn token_request(body: &str, operation_name: &str) -> Option<TokenRequest> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let is_token_request =
        |item: &Value| item.get("operationName").and_then(Value::as_str) == Some(operation_name);

    let (target, batch_index) = match &payload {
        Value::Array(items) => {
            let index = items.iter().position(is_token_request)?;
            (&items[index], Some(index))
        }
        single => (Some(single).filter(|v| is_token_request(v))?, None),
    };

    let variables = target.get("variables")?;
    let login = variables
        .get("login")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())?;
    let context = variables
        .get("playerType")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_CONTEXT);

    Some(TokenRequest {
        key: TokenKey::new(login, context),
        batch_index,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayReply {
    pub status: u16,
    pub body: Bytes,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct TokenRelay {
    cache: TokenCache,
    client: Client,
    endpoint: TokenEndpointConfig,
}

impl TokenRelay {
    pub fn new(cache: TokenCache, client: Client, endpoint: TokenEndpointConfig) -> Self {
        Self {
            cache,
            client,
            endpoint,
        }
    }

    pub async fn handle(&self, body: Bytes) -> AppResult<RelayReply> {
        let request = std::str::from_utf8(&body)
            .ok()
            .and_then(|text| token_request(text, &self.endpoint.operation_name));

        match request {
            Some(TokenRequest {
                key,
                batch_index: None,
            }) => {
                debug!(target = "token_cache", key = %key, "answering token request from cache");
                let payload = self.cache.get_token(&key).await?;
                Ok(RelayReply {
                    status: 200,
                    body: encode(&payload)?,
                    from_cache: true,
                })
            }
            Some(TokenRequest {
                key,
                batch_index: Some(index),
            }) => {
                debug!(target = "token_cache", key = %key, index, "forwarding batched token request");
                let reply = self.forward(body).await?;
                self.sanitize_batch(reply, &key, index).await
            }
            None => self.forward(body).await,
        }
    }

    async fn forward(&self, body: Bytes) -> AppResult<RelayReply> {
        let response = self
            .client
            .post(&self.endpoint.url)
            .header("Client-ID", &self.endpoint.client_id)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(RelayReply {
            status,
            body,
            from_cache: false,
        })
    }

    /// Store the token element of a batched response and sanitize the whole array
    async fn sanitize_batch(
        &self,
        reply: RelayReply,
        key: &TokenKey,
        index: usize,
    ) -> AppResult<RelayReply> {
        if !(200..300).contains(&reply.status) {
            return Ok(reply);
        }
        let Ok(mut payload) = serde_json::from_slice::<Value>(&reply.body) else {
            return Ok(reply);
        };
        let Some(item) = payload.as_array().and_then(|items| items.get(index)).cloned() else {
            return Ok(reply);
        };

        self.cache.store(key, item).await;
        self.cache.sanitizer().sanitize_in_place(&mut payload);

        Ok(RelayReply {
            body: encode(&payload)?,
            ..reply
        })
    }
}

fn encode(payload: &Value) -> AppResult<Bytes> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|e| AppError::internal(format!("token payload encode: {e}")))
}
