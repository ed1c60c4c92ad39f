use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{ParseError, SourceError};
use crate::model::{Manifest, Playlist};
use crate::parser::parse_playlist;
use crate::select::VariantSelection;

/// Number of nested playlists that may be fetched below the initial one.
pub const MAX_NESTING: usize = 2;

/// Loads the text of a variant playlist.
#[async_trait]
pub trait VariantSource: Send + Sync {
    async fn fetch_playlist(&self, url: &Url) -> Result<String, SourceError>;
}

/// Parses `text` and follows variant selection down to a media playlist.
///
/// The returned manifest keeps the variant table of the top-level playlist
/// and the index that was selected from it.
pub async fn resolve_manifest(
    text: &str,
    url: &Url,
    source: &dyn VariantSource,
    selection: VariantSelection,
) -> Result<Manifest, ParseError> {
    let mut current_text = text.to_owned();
    let mut current_url = url.clone();
    let mut top_level = None;

    for depth in 0..=MAX_NESTING {
        match parse_playlist(&current_text, &current_url)? {
            Playlist::Media(mut manifest) => {
                if let Some((variants, selected)) = top_level {
                    manifest.variants = variants;
                    manifest.selected_variant = Some(selected);
                }
                return Ok(manifest);
            }
            Playlist::Master(variants) => {
                if depth == MAX_NESTING {
                    break;
                }
                let selected = selection.select(&variants).ok_or(ParseError::NoVariants)?;
                let next = variants[selected].url.clone();
                debug!(
                    depth,
                    url = %next,
                    bandwidth = variants[selected].bandwidth,
                    "following variant playlist"
                );

                current_text = source
                    .fetch_playlist(&next)
                    .await
                    .map_err(|e| ParseError::variant_fetch(next.as_str(), e))?;
                current_url = next;
                if top_level.is_none() {
                    top_level = Some((variants, selected));
                }
            }
        }
    }

    Err(ParseError::TooDeep {
        max_depth: MAX_NESTING,
    })
}
