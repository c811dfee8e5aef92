//! Command-line parameters for the demo programs.
//!
//! Arguments are consumed as `--key value` pairs into a case-insensitive
//! map; lookups fall back to caller-supplied defaults.

use std::collections::HashMap;
use std::str::FromStr;

/// A case-insensitive `--key value` parameter map.
#[derive(Debug, Default)]
pub struct Params {
    map: HashMap<String, String>,
}

impl Params {
    /// Reads the process arguments, skipping the program name.
    pub fn from_env() -> Self {
        Self::from_iter(std::env::args().skip(1))
    }

    /// Builds a map from `--key value` pairs. A trailing key without a
    /// value is ignored.
    pub fn from_iter(arguments: impl IntoIterator<Item = String>) -> Self {
        let mut map = HashMap::new();
        let mut arguments = arguments.into_iter();
        while let Some(key) = arguments.next() {
            let Some(value) = arguments.next() else {
                break;
            };
            map.insert(key.to_ascii_lowercase(), value);
        }
        Self { map }
    }

    /// The raw value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// The value for `key`, or `default` when unset.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// The parsed value for `key`, or `default` when unset or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(arguments: &[&str]) -> Params {
        Params::from_iter(arguments.iter().map(|s| s.to_string()))
    }

    #[test]
    fn pairs_are_collected_case_insensitively() {
        let params = params(&["--Port", "9091", "--server", "example.com"]);
        assert_eq!(params.get("--port"), Some("9091"));
        assert_eq!(params.get_or("--server", "fallback"), "example.com");
    }

    #[test]
    fn defaults_cover_missing_and_unparsable_values() {
        let params = params(&["--port", "not-a-number"]);
        assert_eq!(params.get_parsed("--port", 9091u16), 9091);
        assert_eq!(params.get_parsed("--retries", 3u32), 3);
    }

    #[test]
    fn trailing_key_without_value_is_ignored() {
        let params = params(&["--port", "80", "--verbose"]);
        assert_eq!(params.get("--verbose"), None);
        assert_eq!(params.get("--port"), Some("80"));
    }
}
