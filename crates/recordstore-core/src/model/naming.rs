//! Field naming conventions applied by the record serializer.

use serde::{Deserialize, Serialize};

/// Naming convention applied to property names when serializing a record.
///
/// Mirrors the case conversions of serde's `rename_all` so the model can
/// predict the field names the serializer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NamingPolicy {
    /// Property names are used verbatim.
    #[default]
    Identity,
    /// `camelCase`.
    CamelCase,
    /// `PascalCase`.
    PascalCase,
    /// `snake_case`.
    SnakeCase,
    /// `kebab-case`.
    KebabCase,
    /// `SCREAMING_SNAKE_CASE`.
    ScreamingSnakeCase,
}

impl NamingPolicy {
    /// Applies the convention to a property name.
    pub fn apply(&self, name: &str) -> String {
        if matches!(self, Self::Identity) {
            return name.to_owned();
        }

        let words = split_words(name);
        match self {
            Self::Identity => name.to_owned(),
            Self::CamelCase => words
                .iter()
                .enumerate()
                .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
                .collect(),
            Self::PascalCase => words.iter().map(|w| capitalize(w)).collect(),
            Self::SnakeCase => join_lower(&words, "_"),
            Self::KebabCase => join_lower(&words, "-"),
            Self::ScreamingSnakeCase => join_lower(&words, "_").to_uppercase(),
        }
    }
}

/// Serializer options threaded into the model builder and mappers.
///
/// Passed explicitly per collection; there is no process-wide default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Naming convention of the record serializer.
    pub naming_policy: NamingPolicy,
}

impl SerializerOptions {
    /// Creates options with the given naming convention.
    pub fn new(naming_policy: NamingPolicy) -> Self {
        Self { naming_policy }
    }

    /// Sets the naming convention.
    pub fn with_naming_policy(mut self, naming_policy: NamingPolicy) -> Self {
        self.naming_policy = naming_policy;
        self
    }
}

/// Splits an identifier on separators and lower-to-upper case boundaries.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }

        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }

        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_lower(words: &[String], separator: &str) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_name() {
        assert_eq!(NamingPolicy::Identity.apply("hotel_name"), "hotel_name");
        assert_eq!(NamingPolicy::Identity.apply("HotelName"), "HotelName");
    }

    #[test]
    fn camel_case_from_snake_and_pascal() {
        assert_eq!(NamingPolicy::CamelCase.apply("hotel_name"), "hotelName");
        assert_eq!(NamingPolicy::CamelCase.apply("HotelName"), "hotelName");
        assert_eq!(NamingPolicy::CamelCase.apply("id"), "id");
    }

    #[test]
    fn other_conventions() {
        assert_eq!(NamingPolicy::PascalCase.apply("hotel_name"), "HotelName");
        assert_eq!(NamingPolicy::SnakeCase.apply("hotelName"), "hotel_name");
        assert_eq!(NamingPolicy::KebabCase.apply("hotel_name"), "hotel-name");
        assert_eq!(
            NamingPolicy::ScreamingSnakeCase.apply("hotelName"),
            "HOTEL_NAME"
        );
    }

    #[test]
    fn digits_stay_with_their_word() {
        assert_eq!(NamingPolicy::SnakeCase.apply("vector2D"), "vector2_d");
        assert_eq!(NamingPolicy::CamelCase.apply("embedding_v2"), "embeddingV2");
    }

    #[test]
    fn parse_from_string() {
        let policy: NamingPolicy = "camel_case".parse().unwrap();
        assert_eq!(policy, NamingPolicy::CamelCase);
    }
}
