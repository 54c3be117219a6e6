//! Human-readable durations for configuration values (`"45s"`, `"1m30s"`, or plain seconds).

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Serde helpers for `Duration` fields, used with `#[serde(with = "duration_serde::duration")]`
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '45s', '500ms')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::duration")]
        ttl: Duration,
    }

    #[test]
    fn accepts_human_readable_and_numeric_durations() {
        let human: Holder = toml::from_str(r#"ttl = "45s""#).unwrap();
        assert_eq!(human.ttl, Duration::from_secs(45));

        let millis: Holder = toml::from_str(r#"ttl = "1500ms""#).unwrap();
        assert_eq!(millis.ttl, Duration::from_millis(1500));

        let numeric: Holder = toml::from_str("ttl = 30").unwrap();
        assert_eq!(numeric.ttl, Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(toml::from_str::<Holder>(r#"ttl = "soon""#).is_err());
    }

    #[test]
    fn serializes_back_to_human_form() {
        let out = toml::to_string(&Holder {
            ttl: Duration::from_secs(90),
        })
        .unwrap();
        assert!(out.contains("1m 30s"));
    }
}
