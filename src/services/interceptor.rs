//! Interception boundary
//!
//! Takes a raw response body and hands back bytes, never an error. Anything
//! that goes wrong inside the engine, including a panic, forwards the original
//! body unchanged.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tracing::{trace, warn};

use crate::errors::RewriteError;
use crate::observability::metrics::metrics;
use crate::services::engine::StreamCleaner;
use crate::utils::UrlUtils;

#[derive(Clone)]
pub struct Interceptor {
    engine: Arc<StreamCleaner>,
}

impl Interceptor {
    pub fn new(engine: Arc<StreamCleaner>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<StreamCleaner> {
        &self.engine
    }

    pub async fn intercept(&self, body: Bytes, url: Option<&str>) -> Bytes {
        if !self.engine.context().is_enabled() {
            trace!(target = "interceptor", "engine disabled, forwarding original body");
            return body;
        }

        match self.try_intercept(&body, url).await {
            Ok(Some(rewritten)) => rewritten,
            Ok(None) => body,
            Err(err) => {
                warn!(
                    target = "interceptor",
                    url = %url.map(UrlUtils::obfuscate_credentials).unwrap_or_default(),
                    error = %err,
                    "rewrite failed, forwarding original body"
                );
                metrics().passthrough_fallbacks.add(1, &[]);
                self.engine.context().record_passthrough();
                body
            }
        }
    }

    /// `Ok(None)` when the body is not a manifest at all
    async fn try_intercept(
        &self,
        body: &Bytes,
        url: Option<&str>,
    ) -> Result<Option<Bytes>, RewriteError> {
        let text = std::str::from_utf8(body)?;
        if !looks_like_manifest(text) {
            return Ok(None);
        }

        let processed = AssertUnwindSafe(self.engine.process(text, url))
            .catch_unwind()
            .await
            .map_err(|panic| RewriteError::Panicked {
                message: panic_message(panic.as_ref()),
            })?;

        Ok(Some(Bytes::from(processed.body)))
    }
}

fn looks_like_manifest(text: &str) -> bool {
    text.trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("#EXTM3U")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
