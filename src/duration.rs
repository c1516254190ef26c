//! Human-readable duration strings (`"30s"`, `"5m"`, `"1h30m"`), accepted
//! anywhere the CLI or config takes a timeout, alongside a bare-seconds
//! integer.

use std::time::Duration;

use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like `"30s"`, `"5m"`, `"1h30m"`, or a bare
/// integer (interpreted as seconds).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_secs: u64 = 0;
    let mut num = String::new();
    let mut saw_unit = false;

    for c in input.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else {
            if num.is_empty() {
                return Err(format!("invalid duration '{input}': expected digits before unit '{c}'"));
            }
            let value: u64 = num
                .parse()
                .map_err(|_| format!("invalid duration '{input}'"))?;
            num.clear();
            let multiplier = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                other => return Err(format!("invalid duration unit '{other}' in '{input}'")),
            };
            total_secs += value * multiplier;
            saw_unit = true;
        }
    }

    if !num.is_empty() || !saw_unit {
        return Err(format!("invalid duration '{input}': trailing digits without a unit"));
    }

    Ok(Duration::from_secs(total_secs))
}

/// `serde` deserializer for fields that accept either a bare-seconds number
/// or a human duration string.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Human(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Repr::Human(s) => parse_duration(&s).map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_single_unit() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn parses_compound_duration() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5").is_ok());
        assert!(parse_duration("h5").is_err());
    }
}
