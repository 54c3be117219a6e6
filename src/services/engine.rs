use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::manifest::{EMPTY_STREAM_MANIFEST, ManifestRewriter, RewriteOutcome};
use crate::services::alternate_source::AlternateSourceProber;
use crate::services::context::EngineContext;
use crate::services::token_cache::TokenCache;
use crate::utils::{ManifestFetcher, UrlUtils};

/// Where the delivered manifest came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Rewritten,
    Alternate { context: String },
    /// Rewriting removed every segment; the input minus its ad markup (or an empty stream)
    MarkupStripped,
}

#[derive(Debug, Clone)]
pub struct ProcessedManifest {
    pub body: String,
    pub outcome: RewriteOutcome,
    pub source: ManifestSource,
}

/// Rewriter plus optional prober, reporting into the shared [`EngineContext`]
pub struct StreamCleaner {
    rewriter: ManifestRewriter,
    prober: Option<AlternateSourceProber>,
    context: Arc<EngineContext>,
}

impl StreamCleaner {
    pub fn new(
        rewriter: ManifestRewriter,
        prober: Option<AlternateSourceProber>,
        context: Arc<EngineContext>,
    ) -> Self {
        Self {
            rewriter,
            prober,
            context,
        }
    }

    /// Wire the rewriter and, when enabled, the prober from configuration
    pub fn from_config(
        config: &Config,
        tokens: TokenCache,
        fetcher: Arc<dyn ManifestFetcher>,
        context: Arc<EngineContext>,
    ) -> Self {
        let rewriter = ManifestRewriter::from_config(config);
        let prober = config.prober.enabled.then(|| {
            AlternateSourceProber::new(
                tokens,
                fetcher,
                rewriter.markers().clone(),
                config.prober.clone(),
            )
        });
        Self::new(rewriter, prober, context)
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Rewrite `text`; when ads survive and the channel is known, look for a clean alternate
    pub async fn process(&self, text: &str, url: Option<&str>) -> ProcessedManifest {
        let outcome = self.rewriter.rewrite(text);
        let mut processed = ProcessedManifest {
            body: outcome.text.clone(),
            outcome,
            source: ManifestSource::Rewritten,
        };

        if processed.outcome.needs_probe()
            && let Some(prober) = self.prober.as_ref().filter(|p| p.is_enabled())
            && let Some(url) = url
            && let Some(channel) = UrlUtils::extract_channel(url)
        {
            debug!(target = "prober", channel = %channel, "ads remain after rewrite, probing alternates");
            if let Some(clean) = prober.probe(&channel, url).await {
                processed.body = clean.manifest;
                processed.source = ManifestSource::Alternate {
                    context: clean.context,
                };
            }
        }

        if processed.source == ManifestSource::Rewritten && processed.outcome.is_degenerate() {
            let stripped = self.rewriter.strip_ad_markup(text);
            warn!(
                target = "manifest.rewrite",
                removed = processed.outcome.segments_removed,
                empty_stream = stripped.is_none(),
                "every segment removed; serving input with ad markup stripped"
            );
            processed.body = stripped.unwrap_or_else(|| EMPTY_STREAM_MANIFEST.to_string());
            processed.source = ManifestSource::MarkupStripped;
        }

        self.report(&processed, url).await;
        processed
    }

    async fn report(&self, processed: &ProcessedManifest, url: Option<&str>) {
        let outcome = &processed.outcome;
        let alternate = matches!(processed.source, ManifestSource::Alternate { .. });
        self.context
            .record_manifest(outcome.segments_removed, alternate);

        if outcome.segments_removed == 0 && !alternate {
            return;
        }

        let target = url
            .map(UrlUtils::obfuscate_credentials)
            .unwrap_or_else(|| "<inline>".to_string());
        let message = match &processed.source {
            ManifestSource::Alternate { context } => format!(
                "{target}: replaced with clean {context} source ({} segments removed locally)",
                outcome.segments_removed
            ),
            ManifestSource::MarkupStripped => format!(
                "{target}: all {} segments flagged, served with ad markup stripped",
                outcome.segments_removed
            ),
            ManifestSource::Rewritten if outcome.collapsed => {
                format!("{target}: ad-only manifest replaced with empty stream")
            }
            ManifestSource::Rewritten => format!(
                "{target}: {} ad segments removed in {}us",
                outcome.segments_removed,
                outcome.elapsed.as_micros()
            ),
        };
        info!(target = "manifest.rewrite", "{}", message);
        self.context.log(message).await;
    }
}
