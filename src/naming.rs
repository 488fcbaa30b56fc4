//! Identifier naming conventions.
//!
//! Header text arrives in whatever casing the sheet author used; generated
//! identifiers need a fixed convention per role (field, constant, type). The
//! source convention decides where word boundaries are, `heck` renders the
//! target.

use std::{borrow::Cow, fmt, str::FromStr};

use anyhow::anyhow;
use clap::ValueEnum;
use heck::{ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// exampleName
    LowerCamel,
    /// ExampleName
    UpperCamel,
    /// example_name
    Snake,
    /// EXAMPLE_NAME
    UpperSnake,
    /// example-name
    Kebab,
}

impl NamingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingConvention::LowerCamel => "lower-camel",
            NamingConvention::UpperCamel => "upper-camel",
            NamingConvention::Snake => "snake",
            NamingConvention::UpperSnake => "upper-snake",
            NamingConvention::Kebab => "kebab",
        }
    }

    /// Splits `input` into lowercase words according to this convention.
    fn words(&self, input: &str) -> Vec<String> {
        match self {
            NamingConvention::Snake | NamingConvention::UpperSnake => split_on(input, '_'),
            NamingConvention::Kebab => split_on(input, '-'),
            NamingConvention::LowerCamel | NamingConvention::UpperCamel => split_camel(input),
        }
    }

    fn render(&self, snake: &str) -> String {
        match self {
            NamingConvention::LowerCamel => snake.to_lower_camel_case(),
            NamingConvention::UpperCamel => snake.to_upper_camel_case(),
            NamingConvention::Snake => snake.to_snake_case(),
            NamingConvention::UpperSnake => snake.to_shouty_snake_case(),
            NamingConvention::Kebab => snake.to_kebab_case(),
        }
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamingConvention {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "lower-camel" | "camel" => Ok(NamingConvention::LowerCamel),
            "upper-camel" | "pascal" => Ok(NamingConvention::UpperCamel),
            "snake" => Ok(NamingConvention::Snake),
            "upper-snake" | "shouty-snake" => Ok(NamingConvention::UpperSnake),
            "kebab" => Ok(NamingConvention::Kebab),
            _ => Err(anyhow!(
                "Unknown naming convention '{value}'. Supported: lower-camel, upper-camel, snake, upper-snake, kebab"
            )),
        }
    }
}

/// Converts `input` from one naming convention to another, borrowing when
/// the result is unchanged.
pub fn convert(input: &str, from: NamingConvention, to: NamingConvention) -> Cow<'_, str> {
    if input.is_empty() || from == to {
        return Cow::Borrowed(input);
    }
    let snake = from.words(input).join("_");
    let converted = to.render(&snake);
    if converted == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(converted)
    }
}

fn split_on(input: &str, separator: char) -> Vec<String> {
    input
        .split(separator)
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect()
}

/// Breaks only at a lowercase-to-uppercase transition, so acronyms such as
/// `HPMax` stay one word.
fn split_camel(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for ch in input.chars() {
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current).to_lowercase());
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current.to_lowercase());
    }
    words
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "typeof", "unsized", "virtual", "yield", "try", "gen",
];

/// Makes a converted name usable as a Rust identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a `_`
/// prefix and keywords are emitted as raw identifiers.
pub fn sanitize_identifier(name: &str) -> Cow<'_, str> {
    let clean = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !name.is_empty()
        && !name.starts_with(|ch: char| ch.is_ascii_digit());
    if clean {
        if RUST_KEYWORDS.contains(&name) {
            return match name {
                "self" | "Self" | "super" | "crate" => Cow::Owned(format!("{name}_")),
                _ => Cow::Owned(format!("r#{name}")),
            };
        }
        return Cow::Borrowed(name);
    }
    let mut sanitized: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    if sanitized.is_empty() || sanitized.starts_with(|ch: char| ch.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    Cow::Owned(sanitized)
}
