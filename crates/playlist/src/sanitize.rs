//! Pre-pass that turns untrusted playlist text into something `m3u8-rs` will
//! accept, dropping every line it cannot vouch for.
//!
//! Tags that describe the next segment (`EXTINF`, `EXT-X-BYTERANGE`,
//! `EXT-X-STREAM-INF`) are held back until their URI line shows up. If one of
//! them is malformed, or the URI itself is unusable, the whole entry is dropped
//! so no stray tag can attach itself to the following segment.

use std::borrow::Cow;

use tracing::debug;

use crate::error::ParseError;

const HEADER: &str = "#EXTM3U";

enum TagCheck<'a> {
    /// Applies from here on, emitted immediately.
    Global(Cow<'a, str>),
    /// Belongs to the next URI line.
    Scoped(Cow<'a, str>),
    /// Malformed segment-scoped tag; the entry it belongs to is dropped.
    PoisonsEntry,
    /// Malformed global tag; only the line is dropped.
    Invalid,
    /// Not needed downstream.
    Ignored,
}

/// Returns the cleaned playlist text.
///
/// Fails only when the text has no `#EXTM3U` header.
pub fn sanitize(text: &str) -> Result<String, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    match lines.next() {
        Some(first) if first.starts_with(HEADER) => {}
        _ => return Err(ParseError::malformed("missing #EXTM3U header")),
    }

    let mut out = String::with_capacity(text.len());
    out.push_str(HEADER);
    out.push('\n');

    let mut pending: Vec<Cow<'_, str>> = Vec::new();
    let mut poisoned = false;
    let mut variants_seen = 0usize;
    let mut variants_kept = 0usize;

    for (line_no, line) in lines.enumerate() {
        if line.starts_with('#') {
            if is_stream_inf(line) {
                variants_seen += 1;
            }
            match check_tag(line) {
                TagCheck::Global(tag) => push_line(&mut out, &tag),
                TagCheck::Scoped(tag) => pending.push(tag),
                TagCheck::PoisonsEntry => {
                    debug!(line = line_no + 2, tag = line, "dropping malformed segment tag");
                    poisoned = true;
                }
                TagCheck::Invalid => {
                    debug!(line = line_no + 2, tag = line, "dropping malformed tag");
                }
                TagCheck::Ignored => {}
            }
            continue;
        }

        if poisoned || !is_usable_uri(line) {
            debug!(line = line_no + 2, uri = line, "dropping playlist entry");
            pending.clear();
            poisoned = false;
            continue;
        }

        for tag in pending.drain(..) {
            if is_stream_inf(&tag) {
                variants_kept += 1;
            }
            push_line(&mut out, &tag);
        }
        push_line(&mut out, line);
    }

    // Without its variant entries a master playlist would read as an empty
    // media playlist.
    if variants_seen > 0 && variants_kept == 0 {
        debug!(dropped = variants_seen, "every variant entry was malformed");
        return Err(ParseError::NoVariants);
    }

    Ok(out)
}

fn is_stream_inf(line: &str) -> bool {
    line.split_once(':').map_or(line, |(name, _)| name) == "#EXT-X-STREAM-INF"
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn check_tag(line: &str) -> TagCheck<'_> {
    let (name, value) = match line.split_once(':') {
        Some((name, value)) => (name, Some(value.trim())),
        None => (line, None),
    };

    match name {
        "#EXTINF" => scoped_if(value.is_some_and(valid_extinf), line),
        "#EXT-X-BYTERANGE" => scoped_if(value.and_then(parse_byterange).is_some(), line),
        "#EXT-X-STREAM-INF" => {
            scoped_if(value.is_some_and(|v| numeric_attr(v, "BANDWIDTH")), line)
        }
        "#EXT-X-I-FRAME-STREAM-INF" => global_if(
            value.is_some_and(|v| numeric_attr(v, "BANDWIDTH") && attribute(v, "URI").is_some()),
            line,
        ),
        "#EXT-X-KEY" => global_if(value.is_some_and(valid_key), line),
        "#EXT-X-MAP" => global_if(value.is_some_and(|v| valid_map(v)), line),
        "#EXT-X-MEDIA-SEQUENCE" | "#EXT-X-DISCONTINUITY-SEQUENCE" | "#EXT-X-VERSION" => {
            global_if(value.is_some_and(|v| v.parse::<u64>().is_ok()), line)
        }
        "#EXT-X-TARGETDURATION" => match value.and_then(parse_target_duration) {
            Some(Cow::Borrowed(_)) => TagCheck::Global(Cow::Borrowed(line)),
            Some(Cow::Owned(rounded)) => {
                TagCheck::Global(Cow::Owned(format!("#EXT-X-TARGETDURATION:{rounded}")))
            }
            None => TagCheck::Invalid,
        },
        "#EXT-X-PLAYLIST-TYPE" => global_if(matches!(value, Some("VOD" | "EVENT")), line),
        "#EXT-X-ENDLIST" | "#EXT-X-DISCONTINUITY" | "#EXT-X-INDEPENDENT-SEGMENTS" => {
            TagCheck::Global(Cow::Borrowed(name))
        }
        _ => TagCheck::Ignored,
    }
}

fn scoped_if(valid: bool, line: &str) -> TagCheck<'_> {
    if valid {
        TagCheck::Scoped(Cow::Borrowed(line))
    } else {
        TagCheck::PoisonsEntry
    }
}

fn global_if(valid: bool, line: &str) -> TagCheck<'_> {
    if valid {
        TagCheck::Global(Cow::Borrowed(line))
    } else {
        TagCheck::Invalid
    }
}

fn valid_extinf(value: &str) -> bool {
    let duration = value.split_once(',').map_or(value, |(d, _)| d).trim();
    duration
        .parse::<f64>()
        .is_ok_and(|d| d.is_finite() && d >= 0.0)
}

/// Parses `<length>[@<offset>]`. Empty ranges are rejected: no `Range`
/// header can ask for zero bytes.
pub(crate) fn parse_byterange(value: &str) -> Option<(u64, Option<u64>)> {
    let (length, offset) = match value.split_once('@') {
        Some((length, offset)) => (length, Some(offset.trim().parse().ok()?)),
        None => (value, None),
    };
    let length: u64 = length.trim().parse().ok()?;
    (length > 0).then_some((length, offset))
}

/// Target durations are integers, but some packagers emit decimals.
fn parse_target_duration(value: &str) -> Option<Cow<'_, str>> {
    if value.parse::<u64>().is_ok() {
        return Some(Cow::Borrowed(value));
    }
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Cow::Owned(format!("{}", seconds.ceil() as u64)))
}

fn valid_key(value: &str) -> bool {
    let Some(method) = attribute(value, "METHOD") else {
        return false;
    };
    if method == "NONE" {
        return true;
    }
    if method.is_empty() || attribute(value, "URI").is_none_or(str::is_empty) {
        return false;
    }
    attribute(value, "IV").is_none_or(|iv| parse_iv(iv).is_some())
}

fn valid_map(value: &str) -> bool {
    if attribute(value, "URI").is_none_or(str::is_empty) {
        return false;
    }
    attribute(value, "BYTERANGE").is_none_or(|range| parse_byterange(range).is_some())
}

fn numeric_attr(value: &str, name: &str) -> bool {
    attribute(value, name).is_some_and(|v| v.parse::<u64>().is_ok())
}

fn is_usable_uri(line: &str) -> bool {
    !line.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Parses a `0x`-prefixed 128-bit IV.
pub(crate) fn parse_iv(value: &str) -> Option<[u8; 16]> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    let mut iv = [0u8; 16];
    hex::decode_to_slice(digits, &mut iv).ok()?;
    Some(iv)
}

/// Splits an attribute list, keeping quoted values (which may contain commas) intact.
pub(crate) fn attributes(input: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut rest = input.trim();

    while let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim();
        let after = &rest[eq + 1..];
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(comma) => (&after[..comma], &after[comma..]),
                None => (after, ""),
            }
        };
        out.push((name, value.trim()));
        rest = remaining.trim_start_matches([',', ' ', '\t']);
    }

    out
}

pub(crate) fn attribute<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    attributes(input)
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}
