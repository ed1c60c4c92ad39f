use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use m3u8_rs::{KeyMethod as RawKeyMethod, MasterPlaylist, MediaPlaylist};
use tracing::{debug, warn};
use url::Url;

use crate::error::ParseError;
use crate::model::{
    ByteRange, EncryptionKey, KeyId, KeyMethod, KeySource, Manifest, Playlist, Segment,
    SegmentKind, Variant,
};
use crate::sanitize::{parse_iv, sanitize};

/// Parses one playlist level.
///
/// Relative URIs are resolved against `base_url`. A master playlist yields its
/// variant table; a media playlist yields a [`Manifest`] with no variants.
pub fn parse_playlist(text: &str, base_url: &Url) -> Result<Playlist, ParseError> {
    let cleaned = sanitize(text)?;

    let parsed = m3u8_rs::parse_playlist_res(cleaned.as_bytes()).map_err(|e| {
        debug!(error = ?e, "m3u8 parser rejected sanitized playlist");
        ParseError::malformed("playlist structure could not be parsed")
    });

    match parsed? {
        m3u8_rs::Playlist::MasterPlaylist(master) => {
            Ok(Playlist::Master(build_variants(&master, base_url)))
        }
        m3u8_rs::Playlist::MediaPlaylist(media) => build_manifest(&media, base_url).map(Playlist::Media),
    }
}

fn build_variants(master: &MasterPlaylist, base_url: &Url) -> Vec<Variant> {
    master
        .variants
        .iter()
        .filter_map(|variant| {
            let url = match base_url.join(&variant.uri) {
                Ok(url) => url,
                Err(e) => {
                    warn!(uri = %variant.uri, error = %e, "skipping variant with unresolvable URI");
                    return None;
                }
            };
            Some(Variant {
                url,
                bandwidth: variant.bandwidth,
                resolution: variant
                    .resolution
                    .as_ref()
                    .map(|r| format!("{}x{}", r.width, r.height)),
                codecs: variant.codecs.clone(),
                iframe_only: variant.is_i_frame,
            })
        })
        .collect()
}

#[derive(Clone, PartialEq)]
struct InitSection {
    url: Url,
    byte_range: Option<ByteRange>,
}

fn build_manifest(media: &MediaPlaylist, base_url: &Url) -> Result<Manifest, ParseError> {
    let mut keys: Vec<EncryptionKey> = Vec::new();
    let mut active_key: Option<KeyId> = None;
    // m3u8-rs attaches EXT-X-MAP only to the segment right after the tag.
    let mut active_map: Option<InitSection> = None;
    let mut emitted_map: Option<InitSection> = None;
    let mut last_range: Option<(Url, u64)> = None;
    let mut segments = Vec::with_capacity(media.segments.len() + 1);

    for (idx, raw) in media.segments.iter().enumerate() {
        let sequence = media.media_sequence + idx as u64;

        if let Some(key) = &raw.key {
            active_key = register_key(&mut keys, key, base_url);
        }
        if let Some(map) = &raw.map {
            active_map = resolve_map(&map.uri, map.byte_range.as_ref(), base_url);
        }

        let url = match base_url.join(&raw.uri) {
            Ok(url) => url,
            Err(e) => {
                warn!(sequence, uri = %raw.uri, error = %e, "skipping segment with unresolvable URI");
                continue;
            }
        };

        let byte_range = raw.byte_range.as_ref().map(|range| {
            let offset = range.offset.unwrap_or_else(|| match &last_range {
                Some((prev_url, end)) if *prev_url == url => *end,
                _ => 0,
            });
            ByteRange {
                offset,
                length: range.length,
            }
        });
        last_range = byte_range.map(|range| (url.clone(), range.end()));

        if let Some(map) = &active_map
            && emitted_map.as_ref() != Some(map)
        {
            debug!(sequence, uri = %map.url, "init section");
            segments.push(Segment {
                url: map.url.clone(),
                byte_range: map.byte_range,
                key: active_key,
                sequence: Some(sequence),
                duration: 0.0,
                kind: SegmentKind::Init,
            });
            emitted_map = Some(map.clone());
        }

        segments.push(Segment {
            url,
            byte_range,
            key: active_key,
            sequence: Some(sequence),
            duration: raw.duration,
            kind: SegmentKind::Media,
        });
    }

    if !segments.iter().any(|s| s.kind == SegmentKind::Media) {
        return Err(ParseError::Empty);
    }

    Ok(Manifest {
        source_url: base_url.clone(),
        variants: Vec::new(),
        selected_variant: None,
        segments,
        keys,
        media_sequence: media.media_sequence,
        target_duration: media.target_duration,
        ended: media.end_list,
    })
}

fn resolve_map(
    uri: &str,
    byte_range: Option<&m3u8_rs::ByteRange>,
    base_url: &Url,
) -> Option<InitSection> {
    match base_url.join(uri) {
        Ok(url) => Some(InitSection {
            url,
            byte_range: byte_range.map(|r| ByteRange {
                offset: r.offset.unwrap_or(0),
                length: r.length,
            }),
        }),
        Err(e) => {
            warn!(uri, error = %e, "ignoring init section with unresolvable URI");
            None
        }
    }
}

/// Adds a key directive to the table, reusing an identical earlier entry.
///
/// Returns `None` for `METHOD=NONE` and for directives whose key source
/// cannot be interpreted.
fn register_key(keys: &mut Vec<EncryptionKey>, raw: &m3u8_rs::Key, base_url: &Url) -> Option<KeyId> {
    let method = match &raw.method {
        RawKeyMethod::None => return None,
        RawKeyMethod::AES128 => KeyMethod::Aes128,
        RawKeyMethod::SampleAES => KeyMethod::SampleAes,
        RawKeyMethod::Other(name) => KeyMethod::Other(name.clone()),
    };

    let source = key_source(raw, base_url)?;
    let iv = raw.iv.as_deref().and_then(parse_iv);

    if let Some(existing) = keys
        .iter()
        .find(|k| k.method == method && k.source == source && k.iv == iv)
    {
        return Some(existing.id);
    }

    let id = KeyId(keys.len());
    keys.push(EncryptionKey {
        id,
        method,
        source,
        iv,
    });
    Some(id)
}

fn key_source(raw: &m3u8_rs::Key, base_url: &Url) -> Option<KeySource> {
    if let Some(keyformat) = raw.keyformat.as_deref()
        && !keyformat.eq_ignore_ascii_case("identity")
    {
        return Some(KeySource::External {
            keyformat: keyformat.to_string(),
            uri: raw.uri.clone(),
        });
    }

    let uri = raw.uri.as_deref()?;
    if uri.starts_with("data:") {
        return match decode_data_uri(uri) {
            Some(bytes) => Some(KeySource::Inline(bytes)),
            None => {
                warn!("ignoring key with undecodable data URI");
                None
            }
        };
    }

    match base_url.join(uri) {
        Ok(url) => Some(KeySource::Uri(url)),
        Err(e) => {
            warn!(uri, error = %e, "ignoring key with unresolvable URI");
            None
        }
    }
}

fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (meta, data) = uri.strip_prefix("data:")?.split_once(',')?;
    if meta.ends_with(";base64") {
        STANDARD.decode(data.trim()).ok()
    } else {
        Some(data.as_bytes().to_vec())
    }
}
