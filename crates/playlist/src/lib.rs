//! HLS manifest parsing for the download engine.
//!
//! Playlist text is treated as hostile: lines that cannot be trusted are
//! dropped before the structural parse, and the result is a flat, ordered
//! [`Manifest`] with absolute URLs, resolved byte ranges and a key table.

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
mod sanitize;
pub mod select;

pub use error::{ParseError, SourceError};
pub use loader::{MAX_NESTING, VariantSource, resolve_manifest};
pub use model::{
    ByteRange, EncryptionKey, KeyId, KeyMethod, KeySource, Manifest, Playlist, Segment,
    SegmentKind, Variant,
};
pub use parser::parse_playlist;
pub use select::VariantSelection;

/// Whether the URL path looks like an HLS playlist.
pub fn looks_like_playlist_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Whether the body looks like playlist text.
pub fn looks_like_playlist(body: &str) -> bool {
    body.trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("#EXTM3U")
}
