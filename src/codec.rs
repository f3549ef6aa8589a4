//! Turning persisted bytes into in-memory payloads and back.

use std::io;
use std::path::Path;

use bytes::Bytes;

/// Converts between the on-disk representation of a resource and the
/// in-memory payload handed to subscribers.
///
/// The codec also defines what a payload weighs, which drives eviction
/// accounting.
pub trait Codec: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    /// Decodes the file at `path` into a payload.
    ///
    /// Returns `None` when the file is missing, empty or undecodable.
    /// Decode failures are not errors at this layer; the caller treats an
    /// absent payload as a failed load.
    fn decode(&self, path: &Path) -> Option<Self::Payload>;

    /// Writes a payload back to disk in its persisted form.
    fn encode(&self, payload: &Self::Payload, path: &Path) -> io::Result<()>;

    /// The byte weight of a payload for eviction accounting.
    fn weight(&self, payload: &Self::Payload) -> u64;
}

/// A pass-through codec that keeps resources as raw bytes.
#[derive(Debug, Clone, Default)]
pub struct BlobCodec;

impl Codec for BlobCodec {
    type Payload = Bytes;

    fn decode(&self, path: &Path) -> Option<Bytes> {
        match std::fs::read(path) {
            Ok(contents) if contents.is_empty() => None,
            Ok(contents) => Some(Bytes::from(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Failed to read cached resource");
                None
            }
        }
    }

    fn encode(&self, payload: &Bytes, path: &Path) -> io::Result<()> {
        std::fs::write(path, payload)
    }

    fn weight(&self, payload: &Bytes) -> u64 {
        payload.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_codec_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let codec = BlobCodec;

        let payload = Bytes::from_static(b"hello");
        codec.encode(&payload, &path).unwrap();
        assert_eq!(codec.decode(&path), Some(payload.clone()));
        assert_eq!(codec.weight(&payload), 5);
    }

    #[test]
    fn test_blob_codec_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let codec = BlobCodec;
        assert_eq!(codec.decode(&dir.path().join("missing")), None);

        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(codec.decode(&empty), None);
    }
}
