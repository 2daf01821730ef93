//! Minimal metainfo inspection.
//!
//! Only the fields the engine needs: the info hash (so a push can be
//! tracked even when a backend does not echo it back), the display name and
//! the declared total size.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use thiserror::Error;

/// Errors from metainfo inspection.
#[derive(Debug, Error)]
pub enum TorrentMetaError {
    #[error("failed to parse torrent: {0}")]
    Parse(String),
}

/// Summary of a `.torrent` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    /// Lowercase hex SHA-1 of the bencoded info dictionary.
    pub info_hash: String,
    pub name: Option<String>,
    /// Sum of file lengths.
    pub total_size: u64,
}

/// Parse a `.torrent` payload.
pub fn inspect(bytes: &[u8]) -> Result<TorrentMeta, TorrentMetaError> {
    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| TorrentMetaError::Parse(e.to_string()))?;

    let info = &torrent.info;
    let name = info
        .name
        .as_ref()
        .map(|b| String::from_utf8_lossy(b.as_ref()).into_owned());

    let total_size = match (&info.files, info.length) {
        (Some(files), _) => files.iter().map(|f| f.length).sum(),
        (None, Some(length)) => length,
        (None, None) => 0,
    };

    Ok(TorrentMeta {
        info_hash: torrent.info_hash.as_string(),
        name,
        total_size,
    })
}
