//! In-process fakes for the token endpoint and upstream manifests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use stream_cleaner::errors::{ProbeError, ProbeResult, TokenResult};
use stream_cleaner::services::TokenIssuer;
use stream_cleaner::utils::ManifestFetcher;

pub const CHANNEL_URL: &str =
    "https://usher.example/api/channel/hls/somechannel.m3u8?allow_source=true&player_type=site";

pub const CLEAN_MANIFEST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:500\n#EXTINF:2.000,live\nclean500.ts\n#EXTINF:2.000,live\nclean501.ts\n";

pub const AD_MANIFEST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:500\n#EXT-X-DATERANGE:ID=\"stitched-ad-1\",CLASS=\"twitch-stitched-ad\",START-DATE=\"2024-05-01T12:00:00Z\"\n#EXTINF:2.000,Amazon\nad1.ts\n#EXTINF:2.000,Amazon\nad2.ts\n";

/// Issues a token whose signature names the context; counts calls
#[derive(Default)]
pub struct FakeIssuer {
    pub calls: AtomicUsize,
}

impl FakeIssuer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for FakeIssuer {
    async fn fetch_token(&self, channel: &str, context: &str) -> TokenResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "data": {
                "streamPlaybackAccessToken": {
                    "signature": format!("sig-{context}"),
                    "value": format!("{{\"channel\":\"{channel}\",\"show_ads\":true}}"),
                    "authorization": { "adsEnabled": true }
                }
            }
        }))
    }
}

/// Serves manifests by `player_type` parameter, or by exact URL, recording every request
#[derive(Default)]
pub struct FakeFetcher {
    pub by_context: HashMap<String, String>,
    pub by_url: HashMap<String, String>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with_context(mut self, context: &str, body: &str) -> Self {
        self.by_context.insert(context.to_string(), body.to_string());
        self
    }

    pub fn with_url(mut self, url: &str, body: &str) -> Self {
        self.by_url.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requested_contexts(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| player_type(u))
            .collect()
    }
}

fn player_type(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "player_type")
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl ManifestFetcher for FakeFetcher {
    async fn fetch_manifest(&self, url: &str) -> ProbeResult<String> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(body) = self.by_url.get(url) {
            return Ok(body.clone());
        }
        // Candidate URLs are signed; plain upstream URLs are not
        let signed = Url::parse(url)
            .map(|u| u.query_pairs().any(|(k, _)| k == "sig"))
            .unwrap_or(false);
        if signed
            && let Some(context) = player_type(url)
            && let Some(body) = self.by_context.get(&context)
        {
            return Ok(body.clone());
        }
        Err(ProbeError::Http { status: 404 })
    }
}
