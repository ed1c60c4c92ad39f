use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static IFRAME_SRC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<iframe\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static SCRIPT_BODY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").unwrap());
static M3U8_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&manifest_url_pattern(".m3u8")).unwrap());

#[inline]
pub fn capture_group_1<'a>(re: &Regex, input: &'a str) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Scheme, then a path ending in `suffix`, then an optional query, then a
/// terminator. Commas end a URL so comma-joined lists split apart.
fn manifest_url_pattern(suffix: &str) -> String {
    format!(
        r#"(https?://[^\s"'<>?#,]+{}(?:\?[^\s"'<>#,]*)?)(?:[\s"'<>#,;&)\]}}\\]|$)"#,
        regex::escape(suffix)
    )
}

/// Finds manifest-shaped URLs (scheme, host, path ending in the suffix) in text.
#[derive(Debug, Clone)]
pub struct ManifestScanner {
    pattern: Regex,
}

impl ManifestScanner {
    /// Builds a scanner for URLs whose path ends in `suffix` (e.g. `.m3u8`).
    pub fn new(suffix: &str) -> Self {
        Self {
            pattern: Regex::new(&manifest_url_pattern(suffix))
                .unwrap_or_else(|_| M3U8_URL_REGEX.clone()),
        }
    }

    /// First match in the raw text.
    pub fn find(&self, text: &str) -> Option<Url> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| Url::parse(trim_trailing(m.as_str())).ok())
    }

    /// Like [`find`](Self::find), but also looks through JSON and HTML escaping.
    pub fn find_loose(&self, text: &str) -> Option<Url> {
        self.find(text).or_else(|| match unescape(text) {
            Cow::Owned(unescaped) => self.find(&unescaped),
            Cow::Borrowed(_) => None,
        })
    }
}

impl Default for ManifestScanner {
    fn default() -> Self {
        Self {
            pattern: M3U8_URL_REGEX.clone(),
        }
    }
}

/// Strips punctuation that page markup commonly glues to the end of a URL.
fn trim_trailing(candidate: &str) -> &str {
    candidate.trim_end_matches([',', ';', ')', ']', '}', '\\'])
}

/// Reverses the escaping players use when embedding URLs in scripts.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') && !text.contains("&amp;") {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("\\/", "/")
            .replace("\\u002F", "/")
            .replace("\\u002f", "/")
            .replace("\\u0026", "&")
            .replace("&amp;", "&"),
    )
}

/// `src` of the first `<iframe>` in the page.
pub fn find_iframe_src(html: &str) -> Option<&str> {
    capture_group_1(&IFRAME_SRC_REGEX, html).map(str::trim)
}

/// Bodies of inline scripts containing any of `markers`.
pub fn scripts_with_markers<'a>(html: &'a str, markers: &[String]) -> Vec<&'a str> {
    SCRIPT_BODY_REGEX
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|body| markers.iter().any(|marker| body.contains(marker.as_str())))
        .collect()
}

/// Joins a possibly relative reference found in a page against the page URL.
pub fn join_reference(page: &Url, reference: &str) -> Option<Url> {
    page.join(reference.trim()).ok()
}
