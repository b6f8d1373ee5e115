//! Topic-pattern matching for routing keys.
//!
//! A routing key is a non-empty, dot-separated sequence of tokens drawn from
//! `[A-Za-z0-9_-]+`. A pattern is the same grammar extended with two wildcard
//! tokens: `*` matches exactly one token, and `#` matches one-or-more tokens.
//! This is a deliberate deviation from conventional AMQP topic matching,
//! where `#` also matches zero tokens; here it never does.

use crate::error::InvalidArgument;
use regex::Regex;

const TOKEN: &str = "[A-Za-z0-9_-]+";

/// A compiled topic pattern, ready to be matched against routing keys.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles `source` into a [`Pattern`].
    ///
    /// Returns [`InvalidArgument::Pattern`] if `source` is empty or contains
    /// a token that is neither a wildcard nor a valid literal token.
    pub fn compile(source: impl Into<String>) -> Result<Self, InvalidArgument> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(InvalidArgument::Pattern(source));
        }

        let mut regex_source = String::with_capacity(source.len() * 2);
        regex_source.push('^');

        for (i, token) in source.split('.').enumerate() {
            if i > 0 {
                regex_source.push_str("\\.");
            }

            match token {
                "*" => regex_source.push_str(TOKEN),
                "#" => regex_source.push_str(&format!("{TOKEN}(?:\\.{TOKEN})*")),
                "" => return Err(InvalidArgument::Pattern(source)),
                literal => {
                    if !literal.chars().all(is_token_char) {
                        return Err(InvalidArgument::Pattern(source));
                    }
                    regex_source.push_str(&regex::escape(literal));
                }
            }
        }

        regex_source.push('$');

        let regex = Regex::new(&regex_source).map_err(|_| InvalidArgument::Pattern(source.clone()))?;

        Ok(Self { source, regex })
    }

    /// Returns `true` if `routing_key` matches this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        self.regex.is_match(routing_key)
    }

    /// The original, uncompiled pattern string.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validates that `routing_key` is a non-empty, dot-separated sequence of
/// `[A-Za-z0-9_-]+` tokens.
pub fn validate_routing_key(routing_key: &str) -> Result<(), InvalidArgument> {
    if routing_key.is_empty()
        || routing_key
            .split('.')
            .any(|token| token.is_empty() || !token.chars().all(is_token_char))
    {
        return Err(InvalidArgument::RoutingKey(routing_key.to_string()));
    }
    Ok(())
}
