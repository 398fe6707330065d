//! Helper for the raw message bytes kept at rest as Zstd compressed data

use std::sync::Arc;

use anyhow::Result;
use zstd::stream::{decode_all as zstd_decode, encode_all as zstd_encode};

/// The raw bytes of one received message, compressed at rest.
///
/// The only contract is a lossless round-trip: `open(seal(x)) == x`.
/// Clones share the underlying buffer, so snapshots handed out by the
/// storage layer stay cheap.
#[derive(Clone, Debug)]
pub struct RawBlob(Arc<Vec<u8>>);

impl RawBlob {
    pub fn seal(plainblob: &[u8]) -> Result<Self> {
        let mut reader = plainblob;
        let zstdblob = zstd_encode(&mut reader, 0)?;
        Ok(Self(Arc::new(zstdblob)))
    }

    pub fn open(&self) -> Result<Vec<u8>> {
        let mut reader = &self.0[..];
        let data = zstd_decode(&mut reader)?;
        Ok(data)
    }

    /// Size of the compressed representation, for logging only.
    pub fn sealed_len(&self) -> usize {
        self.0.len()
    }
}
