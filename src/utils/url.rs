//! URL utilities for manifest and token handling

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use url::Url;

use crate::services::token_cache::PlaybackToken;

/// Presentation context implied by a token that carries a `channel_id` claim
pub const SITE_CONTEXT: &str = "site";

pub struct UrlUtils;

impl UrlUtils {
    /// Channel identifier of a manifest URL.
    ///
    /// Taken from the file stem of a `/channel/hls/<name>.m3u8` path, or from a
    /// `channel=` query parameter.
    ///
    /// ```rust
    /// use stream_cleaner::utils::url::UrlUtils;
    ///
    /// assert_eq!(
    ///     UrlUtils::extract_channel("https://usher.example/api/channel/hls/somechannel.m3u8?sig=x"),
    ///     Some("somechannel".to_string())
    /// );
    /// assert_eq!(UrlUtils::extract_channel("https://cdn.example/live.m3u8"), None);
    /// ```
    pub fn extract_channel(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;

        if parsed.path().contains("/channel/hls/") {
            let stem = parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|file| file.strip_suffix(".m3u8"))
                .filter(|stem| !stem.is_empty());
            if let Some(stem) = stem {
                return Some(stem.to_lowercase());
            }
        }

        parsed
            .query_pairs()
            .find(|(k, _)| k == "channel")
            .map(|(_, v)| v.to_lowercase())
            .filter(|v| !v.is_empty())
    }

    /// Presentation context that produced the manifest, read from its `token` parameter.
    ///
    /// The token is dot-separated; its second part is base64 JSON. A `channel_id`
    /// claim means the token was issued for the `site` context.
    pub fn infer_context(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let token = parsed
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())?;

        let claims = token.split('.').nth(1)?;
        let decoded = decode_base64(claims)?;
        let json: Value = serde_json::from_slice(&decoded).ok()?;

        json.get("channel_id")
            .filter(|v| !v.is_null())
            .map(|_| SITE_CONTEXT.to_string())
    }

    /// `url` with its `sig`, `token` and `player_type` parameters replaced
    pub fn candidate_url(
        url: &str,
        token: &PlaybackToken,
        context: &str,
    ) -> Result<String, url::ParseError> {
        let mut parsed = Url::parse(url)?;
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| !matches!(k.as_ref(), "sig" | "token" | "player_type"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("sig", &token.signature)
            .append_pair("token", &token.value)
            .append_pair("player_type", context);

        Ok(parsed.to_string())
    }

    /// Mask signed query parameters before a URL reaches a log line
    pub fn obfuscate_credentials(url: &str) -> String {
        static SENSITIVE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = SENSITIVE.get_or_init(|| Regex::new(r"(?i)([?&](?:sig|token|auth)=)[^&]*").ok());
        match re {
            Some(re) => re.replace_all(url, "${1}****").to_string(),
            None => url.to_string(),
        }
    }
}

fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}
