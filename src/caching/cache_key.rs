use std::fmt::{self, Write};

use sha2::{Digest, Sha256};

/// The stable on-disk address of a resource identifier.
///
/// The identifier string is SHA256-hashed and the hash is rendered as a
/// two-level relative path below the cache directory. The mapping is
/// one-way and deterministic; two identifiers colliding on the hash is an
/// accepted risk and not handled specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: [u8; 32],
}

impl CacheKey {
    pub fn from_identifier(identifier: &str) -> Self {
        let hash = Sha256::digest(identifier.as_bytes());
        let hash = <[u8; 32]>::try_from(hash.as_slice()).expect("sha256 outputs 32 bytes");
        Self { hash }
    }

    /// Returns the relative path for this key.
    ///
    /// The first hash byte forms a fan-out directory, the rest the file
    /// name: `aa/bbccdd…`.
    pub fn cache_path(&self) -> String {
        let mut path = format!("{:02x}/", self.hash[0]);
        for b in &self.hash[1..] {
            path.write_fmt(format_args!("{b:02x}")).unwrap();
        }
        path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_path())
    }
}
