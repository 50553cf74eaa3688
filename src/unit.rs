use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt::{self, Debug, Display, Formatter};

/// SHA-256 of a unit's bytecode. The engine reports this for the binary it
/// loaded, which tells us whether it runs what we persisted.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct ContentHash([u8; 32]);
impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}
impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(self.0))
    }
}
impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "sha256:{self}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompiledUnit {
    bytes: Bytes,
    hash: ContentHash,
}
impl CompiledUnit {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let hash = ContentHash::of(&bytes);
        Self { bytes, hash }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}
