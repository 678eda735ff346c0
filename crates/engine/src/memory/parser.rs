//! Engine-side configuration string parser
//!
//! Accepts the grammar produced by [`keel_core::ConfigString`]:
//!
//! ```text
//! entries := entry (',' entry)*
//! entry   := token ('=' (token | '(' entries ')'))?
//! token   := [A-Za-z0-9_.]+
//! ```

use keel_core::{EngineError, EngineResult};

/// Deepest group nesting accepted before the input is rejected
pub const MAX_DEPTH: usize = 16;

/// Value attached to a configuration key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Bare key with no value, e.g. `all`
    Flag,
    /// `key=value`
    Scalar(String),
    /// `key=(nested,...)`
    Group(Vec<ConfigEntry>),
}

/// A single `key[=value]` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Entry key
    pub key: String,
    /// Entry value
    pub value: ConfigValue,
}

impl ConfigEntry {
    /// Scalar value, if this entry has one
    pub fn scalar(&self) -> Option<&str> {
        match &self.value {
            ConfigValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Nested entries, if this entry is a group
    pub fn group(&self) -> Option<&[ConfigEntry]> {
        match &self.value {
            ConfigValue::Group(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Parse a configuration string
///
/// # Errors
///
/// Returns `EINVAL` on any syntax error, including non-ASCII input.
pub fn parse(config: &str) -> EngineResult<Vec<ConfigEntry>> {
    let mut parser = Parser {
        config,
        input: config.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let entries = parser.entries()?;
    if parser.pos != parser.input.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(entries)
}

struct Parser<'a> {
    config: &'a str,
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, what: &str) -> EngineError {
        EngineError::new(
            EngineError::INVALID,
            format!("{} at offset {} in '{}'", what, self.pos, self.config),
        )
    }

    fn entries(&mut self) -> EngineResult<Vec<ConfigEntry>> {
        let mut out = Vec::new();
        if matches!(self.peek(), None | Some(b')')) {
            return Ok(out);
        }
        loop {
            out.push(self.entry()?);
            if self.peek() == Some(b',') {
                self.pos += 1;
            } else {
                return Ok(out);
            }
        }
    }

    fn entry(&mut self) -> EngineResult<ConfigEntry> {
        let key = self.token()?;
        if self.peek() != Some(b'=') {
            return Ok(ConfigEntry {
                key,
                value: ConfigValue::Flag,
            });
        }
        self.pos += 1;

        let value = if self.peek() == Some(b'(') {
            self.pos += 1;
            if self.depth == MAX_DEPTH {
                return Err(self.error("nesting too deep"));
            }
            self.depth += 1;
            let nested = self.entries()?;
            self.depth -= 1;
            if self.peek() != Some(b')') {
                return Err(self.error("unclosed group"));
            }
            self.pos += 1;
            ConfigValue::Group(nested)
        } else {
            ConfigValue::Scalar(self.token()?)
        };

        Ok(ConfigEntry { key, value })
    }

    fn token(&mut self) -> EngineResult<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected token"));
        }
        // Only ASCII bytes were consumed
        Ok(self.config[start..self.pos].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(key: &str, value: &str) -> ConfigEntry {
        ConfigEntry {
            key: key.to_string(),
            value: ConfigValue::Scalar(value.to_string()),
        }
    }

    #[test]
    fn test_parse_single_pair() {
        assert_eq!(parse("snapshot=12").unwrap(), vec![scalar("snapshot", "12")]);
    }

    #[test]
    fn test_parse_multiple_pairs() {
        let entries = parse("a=1,b=x,flag").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], scalar("b", "x"));
        assert_eq!(entries[2].value, ConfigValue::Flag);
    }

    #[test]
    fn test_parse_nested_group() {
        let entries = parse("drop=(before=17)").unwrap();
        assert_eq!(entries[0].key, "drop");
        assert_eq!(entries[0].group().unwrap(), &[scalar("before", "17")]);

        let entries = parse("drop=(all)").unwrap();
        assert_eq!(entries[0].group().unwrap()[0].value, ConfigValue::Flag);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["=1", "a=", "a=(b=1", "a=1)", "a=1,,b=2", "a=é", "a b"] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.code, EngineError::INVALID, "input: {:?}", bad);
        }

        let err = parse(&"a=(".repeat(200_000)).unwrap_err();
        assert_eq!(err.code, EngineError::INVALID);
        assert!(err.message.starts_with("nesting too deep"));
    }

    #[test]
    fn test_nesting_up_to_limit_is_accepted() {
        let config = format!("{}b{}", "a=(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        let mut entries = parse(&config).unwrap();
        for _ in 0..MAX_DEPTH {
            let entry = entries.pop().unwrap();
            entries = entry.group().unwrap().to_vec();
        }
        assert_eq!(entries[0].value, ConfigValue::Flag);

        let config = format!("{}b{}", "a=(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&config).unwrap_err().code, EngineError::INVALID);
    }

    mod properties {
        use super::*;
        use keel_core::config_string::{self, ConfigString};
        use keel_core::{SnapshotName, Timestamp};
        use proptest::prelude::*;

        fn token() -> impl Strategy<Value = String> {
            "[a-z_][a-z0-9_.]{0,11}"
        }

        fn entry() -> impl Strategy<Value = ConfigEntry> {
            let leaf = (token(), prop::option::of(token())).prop_map(|(key, value)| ConfigEntry {
                key,
                value: value.map_or(ConfigValue::Flag, ConfigValue::Scalar),
            });
            leaf.prop_recursive(3, 24, 4, |inner| {
                (token(), prop::collection::vec(inner, 1..4)).prop_map(|(key, nested)| {
                    ConfigEntry {
                        key,
                        value: ConfigValue::Group(nested),
                    }
                })
            })
        }

        fn render(entries: &[ConfigEntry]) -> ConfigString {
            entries.iter().fold(ConfigString::new(), |cfg, e| match &e.value {
                ConfigValue::Flag => cfg.flag(&e.key),
                ConfigValue::Scalar(v) => cfg.raw(&e.key, v),
                ConfigValue::Group(nested) => cfg.group(&e.key, render(nested)),
            })
        }

        proptest! {
            #[test]
            fn prop_builder_output_parses_back(entries in prop::collection::vec(entry(), 0..5)) {
                let config = render(&entries).build();
                prop_assert_eq!(parse(&config).unwrap(), entries);
            }

            #[test]
            fn prop_protocol_strings_parse(raw in any::<u64>()) {
                let name = SnapshotName::from_u64(raw);
                let ts = Timestamp::from_u64(raw);

                let drop = parse(&config_string::drop_before(name)).unwrap();
                prop_assert_eq!(drop[0].key.as_str(), "drop");
                let before = &drop[0].group().unwrap()[0];
                let decimal = raw.to_string();
                prop_assert_eq!(before.scalar(), Some(decimal.as_str()));

                let read = parse(&config_string::begin_at_read_timestamp(ts)).unwrap();
                let hex = read[0].scalar().unwrap();
                prop_assert_eq!(Timestamp::from_config_hex(hex), Some(ts));
            }
        }
    }
}
