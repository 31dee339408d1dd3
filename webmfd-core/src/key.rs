//! Session key generation
//!
//! A session key correlates a panel's button transport, its bitmap stream
//! and its registry entry. Keys are 16 characters drawn uniformly from the
//! ASCII alphanumerics.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KeyError;

/// Number of characters in a session key
pub const KEY_LENGTH: usize = 16;

/// Characters a session key is drawn from
pub const KEY_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Opaque identifier of a panel session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Validate an externally supplied key
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let actual = s.chars().count();
        if actual != KEY_LENGTH {
            return Err(KeyError::InvalidLength {
                expected: KEY_LENGTH,
                actual,
            });
        }
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(KeyError::InvalidCharacter(bad));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}

/// Produces session keys that are unique among the reserved identifiers
///
/// Allocation has no side effect: a key only becomes reserved once the
/// caller registers it.
#[derive(Debug)]
pub struct KeyAllocator {
    rng: StdRng,
}

impl KeyAllocator {
    /// Create an allocator seeded from system entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic allocator (for tests)
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw a single candidate key without any collision check
    pub fn candidate(&mut self) -> SessionKey {
        let key: String = (0..KEY_LENGTH)
            .map(|_| KEY_ALPHABET[self.rng.gen_range(0..KEY_ALPHABET.len())] as char)
            .collect();
        SessionKey(key)
    }

    /// Allocate a key for which `is_reserved` returns false
    ///
    /// Resamples until a free key is found. With 62^16 possible keys the
    /// loop practically never runs more than once.
    pub fn allocate(&mut self, is_reserved: impl Fn(&SessionKey) -> bool) -> SessionKey {
        loop {
            let candidate = self.candidate();
            if !is_reserved(&candidate) {
                return candidate;
            }
            debug!(key = %candidate, "Session key collision, resampling");
        }
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new()
    }
}
