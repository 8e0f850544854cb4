//! Vanity prefix validation and multi-target matching.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{BECH32_ALPHABET, NPUB_TAG};

/// Number of symbols in the bech32 alphabet.
const ALPHABET_SIZE: u64 = 32;

/// A validated, lowercase vanity prefix (without the `npub1` tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix(String);

/// Reasons a prefix is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrefixError {
    #[error("prefix cannot be empty")]
    Empty,

    #[error("\"{prefix}\" contains characters outside the bech32 alphacet: {}", format_chars(.invalid))]
    InvalidChars { prefix: String, invalid: Vec<char> },
}

fn format_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(char::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Prefix {
    /// Lowercases `raw` and checks it against the bech32 alphabet.
    ///
    /// Every distinct offending character is listed in the error, in order of
    /// first appearance.
    pub fn validate(raw: &str) -> Result<Self, PrefixError> {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() {
            return Err(PrefixError::Empty);
        }

        let mut invalid = Vec::new();
        for c in lower.chars() {
            if !BECH32_ALPHABET.contains(c) && !invalid.contains(&c) {
                invalid.push(c);
            }
        }

        if invalid.is_empty() {
            Ok(Self(lower))
        } else {
            Err(PrefixError::InvalidChars {
                prefix: raw.to_string(),
                invalid,
            })
        }
    }

    /// Returns the prefix text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `npub` starts with `npub1` followed by this prefix.
    #[inline]
    pub fn is_match(&self, npub: &str) -> bool {
        npub.strip_prefix(NPUB_TAG)
            .is_some_and(|rest| rest.starts_with(&self.0))
    }

    /// Returns the expected number of attempts to find a match.
    ///
    /// Each character has 32 possible values, so the expectation is 32^n.
    pub fn estimated_attempts(&self) -> u64 {
        ALPHABET_SIZE.saturating_pow(self.0.len() as u32)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Prefix {
    type Error = PrefixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.0
    }
}

/// Outcome of parsing free-text prefix input.
#[derive(Debug, Default)]
pub struct ParsedPrefixes {
    /// Valid prefixes, deduplicated, in input order
    pub valid: Vec<Prefix>,
    /// Tokens that failed validation
    pub rejected: Vec<PrefixError>,
}

/// Splits `input` on whitespace and commas and validates every token.
pub fn parse_prefixes(input: &str) -> ParsedPrefixes {
    let mut parsed = ParsedPrefixes::default();
    let tokens = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    for token in tokens {
        match Prefix::validate(token) {
            Ok(prefix) if !parsed.valid.contains(&prefix) => parsed.valid.push(prefix),
            Ok(_) => {}
            Err(e) => parsed.rejected.push(e),
        }
    }

    parsed
}

/// The set of prefixes still being searched for.
///
/// Iteration follows insertion order so reports list targets the way the
/// user typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    prefixes: Vec<Prefix>,
}

impl PrefixSet {
    /// Creates a set from the given prefixes, dropping duplicates.
    pub fn new(prefixes: impl IntoIterator<Item = Prefix>) -> Self {
        let mut set = Self::default();
        for prefix in prefixes {
            set.insert(prefix);
        }
        set
    }

    /// Adds a prefix. Returns false if it was already present.
    pub fn insert(&mut self, prefix: Prefix) -> bool {
        if self.contains(&prefix) {
            return false;
        }
        self.prefixes.push(prefix);
        true
    }

    /// Removes a prefix. Returns false if it was not present.
    pub fn remove(&mut self, prefix: &Prefix) -> bool {
        let before = self.prefixes.len();
        self.prefixes.retain(|p| p != prefix);
        self.prefixes.len() != before
    }

    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.prefixes.contains(prefix)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prefix> {
        self.prefixes.iter()
    }

    /// Returns every prefix that `npub` satisfies.
    ///
    /// One key can satisfy several prefixes at once (for example `ab` and
    /// `abc`), so all of them are reported.
    #[inline]
    pub fn matches(&self, npub: &str) -> Vec<Prefix> {
        self.prefixes
            .iter()
            .filter(|p| p.is_match(npub))
            .cloned()
            .collect()
    }

    /// Expected attempts until the easiest remaining prefix is found.
    pub fn estimated_attempts(&self) -> u64 {
        self.prefixes
            .iter()
            .map(Prefix::estimated_attempts)
            .min()
            .unwrap_or(0)
    }

    /// Returns a human-readable difficulty estimate for the easiest prefix.
    pub fn difficulty_description(&self) -> String {
        let diff = self.estimated_attempts();
        match diff {
            0..=1_000 => "Very Easy (< 1 second)".into(),
            1_001..=1_000_000 => "Easy (seconds)".into(),
            1_000_001..=100_000_000 => "Medium (minutes)".into(),
            100_000_001..=10_000_000_000 => "Hard (hours)".into(),
            _ => "Very Hard (days or more)".into(),
        }
    }

    /// Returns the prefixes as a comma separated list.
    pub fn display_list(&self) -> String {
        self.prefixes
            .iter()
            .map(Prefix::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Prefix> for PrefixSet {
    fn from_iter<I: IntoIterator<Item = Prefix>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Distinct characters that are not part of the bech32 alphabet.
pub fn unavailable_letters() -> BTreeSet<char> {
    ('a'..='z')
        .chain('0'..='9')
        .filter(|c| !BECH32_ALPHABET.contains(*c))
        .collect()
}
