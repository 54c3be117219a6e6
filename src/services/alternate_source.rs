//! Alternate-source prober
//!
//! Requests the same channel under other presentation contexts, a bounded batch
//! at a time, and accepts the first ad-free manifest in priority order. A batch
//! is always awaited in full before a winner is picked, so a fast low-priority
//! candidate never beats a slower higher-priority one.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ProberConfig;
use crate::errors::{ProbeError, ProbeResult, TokenError};
use crate::manifest::{MarkerSet, parse};
use crate::observability::metrics::{MetricsKeyValue, metrics};
use crate::services::token_cache::{TokenCache, TokenKey};
use crate::utils::{ManifestFetcher, UrlUtils};

/// An ad-free manifest found under another presentation context
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSource {
    pub context: String,
    pub url: String,
    pub manifest: String,
}

pub struct AlternateSourceProber {
    tokens: TokenCache,
    fetcher: Arc<dyn ManifestFetcher>,
    markers: MarkerSet,
    config: ProberConfig,
    /// Contexts that produced a clean source, most recent first
    successful: Mutex<Vec<String>>,
}

impl AlternateSourceProber {
    pub fn new(
        tokens: TokenCache,
        fetcher: Arc<dyn ManifestFetcher>,
        markers: MarkerSet,
        config: ProberConfig,
    ) -> Self {
        Self {
            tokens,
            fetcher,
            markers,
            config,
            successful: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Previously successful contexts first, then the static list. `excluded` is dropped.
    pub async fn priority_order(&self, excluded: Option<&str>) -> Vec<String> {
        let successful = self.successful.lock().await;
        let mut order: Vec<String> = successful.clone();
        for context in &self.config.player_types {
            if !order.contains(context) {
                order.push(context.clone());
            }
        }
        order.retain(|c| Some(c.as_str()) != excluded);
        order
    }

    /// Probe using the adaptive order, skipping the context the current URL was issued for
    pub async fn probe(&self, channel: &str, current_url: &str) -> Option<CleanSource> {
        let excluded = UrlUtils::infer_context(current_url);
        let order = self.priority_order(excluded.as_deref()).await;
        self.find_clean_source(channel, current_url, &order).await
    }

    pub async fn find_clean_source(
        &self,
        channel: &str,
        current_url: &str,
        priority: &[String],
    ) -> Option<CleanSource> {
        let batch_size = self.config.batch_size.max(1);

        for batch in priority.chunks(batch_size) {
            let attempts = batch
                .iter()
                .map(|context| self.attempt(channel, current_url, context));
            let results = join_all(attempts).await;

            let mut winner = None;
            for (context, result) in batch.iter().zip(results) {
                match result {
                    Ok(candidate) if winner.is_none() => winner = Some(candidate),
                    Ok(_) => debug!(target = "prober", context, "clean candidate discarded, higher priority won"),
                    Err(err) => debug!(target = "prober", context, error = %err, "candidate rejected"),
                }
            }

            if let Some(source) = winner {
                self.remember(&source.context).await;
                metrics().probe_clean_sources.add(1, &[]);
                info!(target = "prober", channel, context = %source.context, "clean source found");
                return Some(source);
            }
        }

        info!(target = "prober", channel, tried = priority.len(), "no clean source found");
        None
    }

    /// A candidate qualifies with at least one segment header and no ad markers
    pub fn qualify(&self, text: &str) -> ProbeResult<()> {
        let manifest = parse(text);
        if manifest.segment_header_count() == 0 {
            return Err(ProbeError::disqualified("no segments"));
        }
        if self.markers.contains_ad_markers(&manifest) {
            return Err(ProbeError::disqualified("ad markers present"));
        }
        Ok(())
    }

    async fn attempt(
        &self,
        channel: &str,
        current_url: &str,
        context: &str,
    ) -> ProbeResult<CleanSource> {
        metrics()
            .probe_attempts
            .add(1, &[MetricsKeyValue::new("context", context.to_string())]);

        let timeout = self.config.attempt_timeout;
        tokio::time::timeout(timeout, self.try_candidate(channel, current_url, context))
            .await
            .unwrap_or(Err(ProbeError::Timeout {
                millis: timeout.as_millis() as u64,
            }))
    }

    async fn try_candidate(
        &self,
        channel: &str,
        current_url: &str,
        context: &str,
    ) -> ProbeResult<CleanSource> {
        let key = TokenKey::new(channel, context);
        let token = self
            .tokens
            .get_playback_token(&key)
            .await
            .map_err(|err| match err {
                TokenError::MissingToken => ProbeError::MissingToken {
                    context: context.to_string(),
                },
                other => other.into(),
            })?;

        let url = UrlUtils::candidate_url(current_url, &token, context).map_err(|_| {
            ProbeError::InvalidUrl {
                url: UrlUtils::obfuscate_credentials(current_url),
            }
        })?;

        let manifest = self.fetcher.fetch_manifest(&url).await?;
        self.qualify(&manifest)?;

        Ok(CleanSource {
            context: context.to_string(),
            url,
            manifest,
        })
    }

    async fn remember(&self, context: &str) {
        let mut successful = self.successful.lock().await;
        successful.retain(|c| c != context);
        successful.insert(0, context.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenCacheConfig;
    use crate::errors::TokenResult;
    use crate::services::token_cache::TokenIssuer;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;
    use url::Url;

    const CURRENT: &str = "https://usher.example/api/channel/hls/somechannel.m3u8?allow_source=true";
    const CLEAN: &str = "#EXTM3U\n#EXTINF:2.0,live\nseg1.ts\n";
    const ADS: &str = "#EXTM3U\n#EXT-X-DATERANGE:CLASS=\"twitch-stitched-ad\"\n#EXTINF:2.0,\nad.ts\n";

    struct SigningIssuer;

    #[async_trait]
    impl TokenIssuer for SigningIssuer {
        async fn fetch_token(&self, channel: &str, context: &str) -> TokenResult<Value> {
            Ok(json!({
                "data": { "streamPlaybackAccessToken": {
                    "signature": format!("sig-{context}"),
                    "value": format!("{{\"channel\":\"{channel}\"}}")
                } }
            }))
        }
    }

    /// Responds per `player_type`; unknown contexts get a 404
    struct ScriptedFetcher {
        responses: HashMap<&'static str, (&'static str, Duration)>,
    }

    #[async_trait]
    impl ManifestFetcher for ScriptedFetcher {
        async fn fetch_manifest(&self, url: &str) -> ProbeResult<String> {
            let parsed = Url::parse(url).map_err(|e| ProbeError::transport(e.to_string()))?;
            let context = parsed
                .query_pairs()
                .find(|(k, _)| k == "player_type")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            match self.responses.get(context.as_str()) {
                Some((body, delay)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(body.to_string())
                }
                None => Err(ProbeError::Http { status: 404 }),
            }
        }
    }

    fn prober(responses: &[(&'static str, &'static str, u64)]) -> AlternateSourceProber {
        let tokens = TokenCache::new(Arc::new(SigningIssuer), &TokenCacheConfig::default());
        let fetcher = ScriptedFetcher {
            responses: responses
                .iter()
                .map(|(ctx, body, ms)| (*ctx, (*body, Duration::from_millis(*ms))))
                .collect(),
        };
        AlternateSourceProber::new(
            tokens,
            Arc::new(fetcher),
            MarkerSet::default(),
            ProberConfig::default(),
        )
    }

    fn contexts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn list_order_beats_completion_order() {
        // index 0 is slow, index 2 is fast; both clean
        let prober = prober(&[("embed", CLEAN, 500), ("frontpage", ADS, 0), ("site", CLEAN, 0)]);
        let source = prober
            .find_clean_source("somechannel", CURRENT, &contexts(&["embed", "frontpage", "site"]))
            .await
            .unwrap();
        assert_eq!(source.context, "embed");
        assert!(source.url.contains("sig=sig-embed"));
        assert!(source.url.contains("player_type=embed"));
    }

    #[tokio::test(start_paused = true)]
    async fn later_batches_are_tried_when_the_first_fails() {
        let prober = prober(&[("mini", CLEAN, 0)]);
        let source = prober
            .find_clean_source(
                "somechannel",
                CURRENT,
                &contexts(&["embed", "frontpage", "site", "mini", "embed-legacy"]),
            )
            .await
            .unwrap();
        assert_eq!(source.context, "mini");
        assert_eq!(source.manifest, CLEAN);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_candidates_time_out() {
        let prober = prober(&[("embed", CLEAN, 60_000), ("frontpage", CLEAN, 10)]);
        let started = tokio::time::Instant::now();
        let source = prober
            .find_clean_source("somechannel", CURRENT, &contexts(&["embed", "frontpage"]))
            .await
            .unwrap();
        assert_eq!(source.context, "frontpage");
        assert!(started.elapsed() <= ProberConfig::default().attempt_timeout + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_qualifies() {
        let prober = prober(&[("embed", ADS, 0), ("site", "#EXTM3U\n", 0)]);
        let source = prober
            .find_clean_source("somechannel", CURRENT, &contexts(&["embed", "site", "mini"]))
            .await;
        assert!(source.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_contexts_move_to_the_front() {
        let prober = prober(&[("mini", CLEAN, 0)]);
        assert_eq!(prober.priority_order(None).await[0], "embed");

        prober.probe("somechannel", CURRENT).await.unwrap();

        let order = prober.priority_order(None).await;
        assert_eq!(order, contexts(&["mini", "embed", "frontpage", "site", "embed-legacy"]));
    }

    #[tokio::test]
    async fn inferred_context_is_excluded() {
        let prober = prober(&[]);
        let order = prober.priority_order(Some("site")).await;
        assert!(!order.contains(&"site".to_string()));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn qualification_requires_segments_and_no_ads() {
        let prober = prober(&[]);
        assert!(prober.qualify(CLEAN).is_ok());
        assert!(matches!(prober.qualify(ADS), Err(ProbeError::Disqualified { .. })));
        assert!(matches!(prober.qualify("#EXTM3U\n"), Err(ProbeError::Disqualified { .. })));
    }
}
