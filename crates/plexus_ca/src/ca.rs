use crate::{CaHash, Hasher};
use serde::{Deserialize, Serialize};
use std::{fmt, ops, str::FromStr};
use thiserror::Error;

/// A 32-byte blake3 content address.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize,
)]
pub struct ContentAddr(pub [u8; 32]);

/// A shortened, human-friendly view of a [`ContentAddr`] for logging.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContentAddrShort<'a>(&'a ContentAddr);

/// Failed to parse a [`ContentAddr`] from its hex representation.
#[derive(Debug, Error)]
pub enum ParseAddrError {
    #[error("invalid hex in content address: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("content address must be 32 bytes, found {0}")]
    Len(usize),
}

impl ContentAddr {
    /// The number of hex characters displayed by [`ContentAddrShort`].
    pub const SHORT_LEN: usize = 8;

    /// A short representation suitable for log messages.
    pub fn short(&self) -> ContentAddrShort<'_> {
        ContentAddrShort(self)
    }

    /// The full lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl ops::Deref for ContentAddr {
    type Target = [u8; 32];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; 32]> for ContentAddr {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<blake3::Hash> for ContentAddr {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.into())
    }
}

impl FromStr for ContentAddr {
    type Err = ParseAddrError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let len = bytes.len();
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| ParseAddrError::Len(len))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl<'a> fmt::Display for ContentAddrShort<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.0.to_hex();
        write!(f, "{}", &hex[..ContentAddr::SHORT_LEN])
    }
}

/// Produce the content address of the given value.
pub fn content_addr<T>(t: &T) -> ContentAddr
where
    T: ?Sized + CaHash,
{
    let mut hasher = Hasher::new();
    t.hash(&mut hasher);
    ContentAddr::from(hasher.finalize())
}
