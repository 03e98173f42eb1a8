//! Serde helpers for human-readable durations in configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Duration as seconds (number) or a humantime string such as `"5s"` or `"3m"`.
///
/// `"0"`, `"0s"` and `0` all deserialize to [`Duration::ZERO`], which the
/// cache settings treat as "disabled".
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.is_zero() {
            return serializer.serialize_str("0s");
        }
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
                    "a duration as seconds (number) or human-readable string (e.g., '5s', '3m', '1h30m')",
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
                parse(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Parse a human-readable duration, accepting a bare `0` as zero.
pub fn parse(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(trimmed).map_err(|e| format!("Invalid duration '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "duration")]
        value: Duration,
    }

    #[test]
    fn test_parse_accepts_strings_and_numbers() {
        let from_str: Wrapper = toml::from_str(r#"value = "3m""#).unwrap();
        assert_eq!(from_str.value, Duration::from_secs(180));

        let from_int: Wrapper = toml::from_str("value = 10").unwrap();
        assert_eq!(from_int.value, Duration::from_secs(10));

        let zero: Wrapper = toml::from_str(r#"value = "0""#).unwrap();
        assert_eq!(zero.value, Duration::ZERO);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let result: Result<Wrapper, _> = toml::from_str(r#"value = "soon""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_round_trips_through_toml() {
        let original = Wrapper {
            value: Duration::from_secs(5),
        };
        let text = toml::to_string(&original).unwrap();
        assert!(text.contains("5s"));
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back, original);
    }
}
