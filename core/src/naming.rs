//! Field-naming conventions applied to struct fields on the wire.
//!
//! Rust fields are declared in `snake_case`; a convention maps each declared
//! name to its wire form. Identifiers are split into words on `_`, `-`, `.`
//! and case humps, then re-joined in the target style, so the mapping also
//! works for fields renamed with `#[serde(rename = "...")]`.

use std::fmt;
use std::str::FromStr;

use crate::error::RestError;

/// How declared field names appear in JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NamingConvention {
    /// Field names are sent exactly as declared.
    #[default]
    AsDeclared,
    SnakeCase,
    CamelCase,
    PascalCase,
    KebabCase,
    ScreamingSnakeCase,
    LowerCase,
    LowerDotCase,
}

impl NamingConvention {
    /// Canonical name, accepted back by `from_str`.
    pub fn as_str(self) -> &'static str {
        match self {
            NamingConvention::AsDeclared => "as_declared",
            NamingConvention::SnakeCase => "snake_case",
            NamingConvention::CamelCase => "camelCase",
            NamingConvention::PascalCase => "PascalCase",
            NamingConvention::KebabCase => "kebab-case",
            NamingConvention::ScreamingSnakeCase => "SCREAMING_SNAKE_CASE",
            NamingConvention::LowerCase => "lowercase",
            NamingConvention::LowerDotCase => "lower.dot.case",
        }
    }

    /// Wire name for the declared field `ident`.
    pub fn apply(self, ident: &str) -> String {
        let words = match self {
            NamingConvention::AsDeclared => return ident.to_string(),
            _ => split_words(ident),
        };
        if words.is_empty() {
            return ident.to_string();
        }
        match self {
            NamingConvention::AsDeclared => ident.to_string(),
            NamingConvention::SnakeCase => join_lower(&words, "_"),
            NamingConvention::KebabCase => join_lower(&words, "-"),
            NamingConvention::LowerDotCase => join_lower(&words, "."),
            NamingConvention::LowerCase => join_lower(&words, ""),
            NamingConvention::ScreamingSnakeCase => words
                .iter()
                .map(|w| w.to_uppercase())
                .collect::<Vec<_>>()
                .join("_"),
            NamingConvention::PascalCase => words.iter().map(|w| capitalize(w)).collect(),
            NamingConvention::CamelCase => {
                let mut out = words[0].to_lowercase();
                for word in &words[1..] {
                    out.push_str(&capitalize(word));
                }
                out
            }
        }
    }

    /// Whether `wire_key` names the declared field `ident`.
    pub fn matches(self, ident: &str, wire_key: &str) -> bool {
        ident == wire_key || self.apply(ident) == wire_key
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamingConvention {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let convention = match s {
            "as_declared" | "identity" => NamingConvention::AsDeclared,
            "snake_case" | "SNAKE_CASE" => NamingConvention::SnakeCase,
            "camelCase" | "LOWER_CAMEL_CASE" => NamingConvention::CamelCase,
            "PascalCase" | "UPPER_CAMEL_CASE" => NamingConvention::PascalCase,
            "kebab-case" | "KEBAB_CASE" => NamingConvention::KebabCase,
            "SCREAMING_SNAKE_CASE" => NamingConvention::ScreamingSnakeCase,
            "lowercase" | "LOWER_CASE" => NamingConvention::LowerCase,
            "lower.dot.case" | "LOWER_DOT_CASE" => NamingConvention::LowerDotCase,
            other => {
                return Err(RestError::configuration(format!(
                    "unknown naming convention `{other}`"
                )))
            }
        };
        Ok(convention)
    }
}

fn split_words(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | '.' | ' ') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        // `current` is non-empty only when chars[i - 1] belongs to it.
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn join_lower(words: &[String], sep: &str) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(sep)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
