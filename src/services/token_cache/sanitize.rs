use std::collections::HashSet;

use serde_json::Value;

use crate::config::TokenCacheConfig;

/// Forces ad-enabling flags off and ad-disabling flags on anywhere in a token payload.
///
/// The walk is iterative. A `serde_json::Value` is a tree that owns its
/// children, so no node can be reached twice.
#[derive(Debug, Clone, Default)]
pub struct TokenSanitizer {
    force_false: HashSet<String>,
    force_true: HashSet<String>,
}

impl TokenSanitizer {
    pub fn new(config: &TokenCacheConfig) -> Self {
        Self {
            force_false: config.force_false_keys.iter().cloned().collect(),
            force_true: config.force_true_keys.iter().cloned().collect(),
        }
    }

    /// Sanitized copy; `payload` is left untouched
    pub fn sanitize(&self, payload: &Value) -> Value {
        let mut copy = payload.clone();
        self.sanitize_in_place(&mut copy);
        copy
    }

    pub fn sanitize_in_place(&self, root: &mut Value) {
        let mut stack: Vec<&mut Value> = vec![root];
        while let Some(node) = stack.pop() {
            match node {
                Value::Object(map) => {
                    for (key, value) in map.iter_mut() {
                        if self.force_false.contains(key) {
                            *value = Value::Bool(false);
                        } else if self.force_true.contains(key) {
                            *value = Value::Bool(true);
                        } else {
                            stack.push(value);
                        }
                    }
                }
                Value::Array(items) => stack.extend(items.iter_mut()),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitizer() -> TokenSanitizer {
        TokenSanitizer::new(&TokenCacheConfig::default())
    }

    #[test]
    fn forces_flags_at_any_depth() {
        let payload = json!({
            "adsEnabled": true,
            "data": {
                "streamPlaybackAccessToken": {
                    "signature": "abc",
                    "value": "{}",
                    "authorization": { "show_ads": true, "disable_ads": false }
                }
            },
            "list": [ { "stitched": true }, { "nested": [ { "csai": "yes" } ] } ]
        });

        let clean = sanitizer().sanitize(&payload);

        assert_eq!(clean["adsEnabled"], json!(false));
        let auth = &clean["data"]["streamPlaybackAccessToken"]["authorization"];
        assert_eq!(auth["show_ads"], json!(false));
        assert_eq!(auth["disable_ads"], json!(true));
        assert_eq!(clean["list"][0]["stitched"], json!(false));
        assert_eq!(clean["list"][1]["nested"][0]["csai"], json!(false));
        assert_eq!(clean["data"]["streamPlaybackAccessToken"]["signature"], json!("abc"));
    }

    #[test]
    fn original_payload_is_not_modified() {
        let payload = json!({ "surestream": true });
        let clean = sanitizer().sanitize(&payload);
        assert_eq!(payload["surestream"], json!(true));
        assert_eq!(clean["surestream"], json!(false));
    }

    #[test]
    fn forced_keys_replace_whole_subtrees() {
        let payload = json!({ "prerollEnabled": { "deep": true } });
        let clean = sanitizer().sanitize(&payload);
        assert_eq!(clean, json!({ "prerollEnabled": false }));
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(sanitizer().sanitize(&json!("text")), json!("text"));
        assert_eq!(sanitizer().sanitize(&json!(null)), json!(null));
    }
}
