//! Vanity prefix matching for npub strings.
//!
//! Prefixes are validated against the bech32 alphabet at input time and
//! matched against the text that follows the fixed `npub1` tag.

mod prefix;

pub use prefix::{parse_prefixes, unavailable_letters, ParsedPrefixes, Prefix, PrefixError, PrefixSet};
