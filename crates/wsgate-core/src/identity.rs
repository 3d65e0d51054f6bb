//! Client identity: a 16-byte value configured as a hyphenated hex string.

use crate::error::{GateError, GateResult};
use std::fmt;
use std::str::FromStr;

/// Width of the identity field in the handshake frame.
pub const IDENTITY_LEN: usize = 16;

/// Byte positions of the hyphens in the canonical 8-4-4-4-12 form.
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// The configured identity, normalized once at startup.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the 36-character hyphenated form, e.g.
    /// `75de94bb-b5cb-4ad4-b72b-251476b36f3a`. Case is ignored.
    pub fn parse(s: &str) -> GateResult<Self> {
        let s = s.trim();
        if s.len() != 36 {
            return Err(GateError::Config(format!(
                "identity must be 36 characters, got {}",
                s.len()
            )));
        }
        for (i, c) in s.char_indices() {
            let is_hyphen_slot = HYPHEN_POSITIONS.contains(&i);
            if is_hyphen_slot != (c == '-') {
                return Err(GateError::Config(format!(
                    "identity has unexpected character {c:?} at position {i}"
                )));
            }
        }

        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let mut bytes = [0u8; IDENTITY_LEN];
        hex::decode_to_slice(compact.to_ascii_lowercase(), &mut bytes)
            .map_err(|e| GateError::Config(format!("identity is not valid hex: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Byte-for-byte comparison against the identity field of a frame.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        candidate == self.0.as_slice()
    }
}

impl FromStr for Identity {
    type Err = GateError;

    fn from_str(s: &str) -> GateResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &h[0..8],
            &h[8..12],
            &h[12..16],
            &h[16..20],
            &h[20..32]
        )
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}
