//! Shared serialization/deserialization utilities for configuration

/// Duration stored as whole seconds.
///
/// Serializes as an integer. Deserializes from an integer, or from a string
/// with an optional `s`, `m` or `h` suffix (`"90"`, `"90s"`, `"2m"`).
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "fa_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds or a suffixed string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SecondsVisitor)
    }

    struct SecondsVisitor;

    impl<'de> Visitor<'de> for SecondsVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("seconds as an integer, or a string like \"30s\", \"2m\", \"1h\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_suffixed(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    fn parse_suffixed(raw: &str) -> Option<Duration> {
        let raw = raw.trim();
        let (digits, multiplier) = match raw.chars().last()? {
            's' => (&raw[..raw.len() - 1], 1),
            'm' => (&raw[..raw.len() - 1], 60),
            'h' => (&raw[..raw.len() - 1], 3600),
            _ => (raw, 1),
        };
        let value: u64 = digits.trim().parse().ok()?;
        value.checked_mul(multiplier).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
    }

    #[test]
    fn test_duration_serializes_as_integer() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(toml::to_string(&config).unwrap().trim(), "timeout = 30");
    }

    #[test]
    fn test_duration_accepts_suffixes() {
        let parse = |s: &str| toml::from_str::<TestConfig>(s).map(|c| c.timeout);
        assert_eq!(parse("timeout = 45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse("timeout = \"45s\"").unwrap(), Duration::from_secs(45));
        assert_eq!(parse("timeout = \"2m\"").unwrap(), Duration::from_secs(120));
        assert_eq!(parse("timeout = \"1h\"").unwrap(), Duration::from_secs(3600));
        assert!(parse("timeout = \"soon\"").is_err());
        assert!(parse("timeout = -1").is_err());
    }
}
