use serde::Serialize;
use url::Url;

/// One entry of a master playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub url: Url,
    pub bandwidth: u64,
    /// `WIDTHxHEIGHT` label, when declared.
    pub resolution: Option<String>,
    pub codecs: Option<String>,
    /// I-frame-only renditions are kept for reporting but never selected.
    pub iframe_only: bool,
}

/// An absolute byte range inside a segment resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Offset one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Value for an HTTP `Range` request header.
    pub fn header_value(&self) -> String {
        let last = self.end().saturating_sub(1).max(self.offset);
        format!("bytes={}-{}", self.offset, last)
    }
}

/// Index into [`Manifest::keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeyId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyMethod {
    Aes128,
    SampleAes,
    Other(String),
}

impl std::fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMethod::Aes128 => f.write_str("AES-128"),
            KeyMethod::SampleAes => f.write_str("SAMPLE-AES"),
            KeyMethod::Other(name) => f.write_str(name),
        }
    }
}

/// Where the key material comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeySource {
    /// Fetched from a URL.
    Uri(Url),
    /// Carried inline through a `data:` URI.
    Inline(Vec<u8>),
    /// Must be acquired through an external key system.
    External {
        keyformat: String,
        uri: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptionKey {
    pub id: KeyId,
    pub method: KeyMethod,
    pub source: KeySource,
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentKind {
    /// Initialisation section declared by `EXT-X-MAP`.
    Init,
    Media,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    pub key: Option<KeyId>,
    /// Media sequence number. Init sections carry the number of the
    /// media segment they precede.
    pub sequence: Option<u64>,
    pub duration: f32,
    pub kind: SegmentKind,
}

impl Segment {
    /// A whole-resource media segment without key or range.
    pub fn whole(url: Url) -> Self {
        Self {
            url,
            byte_range: None,
            key: None,
            sequence: None,
            duration: 0.0,
            kind: SegmentKind::Media,
        }
    }
}

/// A parsed media playlist, plus the variant table it was selected from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub source_url: Url,
    pub variants: Vec<Variant>,
    pub selected_variant: Option<usize>,
    pub segments: Vec<Segment>,
    pub keys: Vec<EncryptionKey>,
    pub media_sequence: u64,
    pub target_duration: u64,
    pub ended: bool,
}

impl Manifest {
    /// Wraps a progressive resource as a one-segment manifest.
    pub fn direct(url: Url) -> Self {
        Self {
            source_url: url.clone(),
            variants: Vec::new(),
            selected_variant: None,
            segments: vec![Segment::whole(url)],
            keys: Vec::new(),
            media_sequence: 0,
            target_duration: 0,
            ended: true,
        }
    }

    pub fn key(&self, id: KeyId) -> Option<&EncryptionKey> {
        self.keys.get(id.0).filter(|key| key.id == id)
    }

    pub fn selected(&self) -> Option<&Variant> {
        self.selected_variant.and_then(|idx| self.variants.get(idx))
    }

    pub fn is_encrypted(&self) -> bool {
        self.segments.iter().any(|segment| segment.key.is_some())
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| f64::from(s.duration)).sum()
    }
}

/// Result of parsing a single playlist level.
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(Manifest),
}
