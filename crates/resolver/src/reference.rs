use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ReferenceError;
use crate::scan::capture_group_1;

static SLUG_REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-([A-Za-z0-9-]+)$").unwrap());
static TITLE_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/titles/(\d+)-([A-Za-z0-9-]+)").unwrap());
static WATCH_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch/(\d+)\?e=(\d+)").unwrap());
static EPISODE_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]episode_id=(\d+)").unwrap());

/// What a site adapter hands to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageReference {
    /// A page URL used as-is.
    Url { url: Url },
    /// A content identifier, optionally with its slug and an episode id.
    Content {
        id: u64,
        slug: Option<String>,
        episode: Option<u64>,
    },
}

impl PageReference {
    pub fn url(url: Url) -> Self {
        Self::Url { url }
    }

    pub fn content(id: u64) -> Self {
        Self::Content {
            id,
            slug: None,
            episode: None,
        }
    }

    pub fn with_slug(self, slug: impl Into<String>) -> Self {
        match self {
            Self::Content { id, episode, .. } => Self::Content {
                id,
                slug: Some(slug.into()),
                episode,
            },
            other => other,
        }
    }

    pub fn with_episode(self, episode: u64) -> Self {
        match self {
            Self::Content { id, slug, .. } => Self::Content {
                id,
                slug,
                episode: Some(episode),
            },
            other => other,
        }
    }

    /// Recognizes `<id>`, `<id>-<slug>`, `.../titles/<id>-<slug>`,
    /// `.../watch/<id>?e=<episode>` and falls back to a plain URL.
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let input = input.trim();

        if let Some(caps) = WATCH_URL_REGEX.captures(input) {
            return Ok(Self::Content {
                id: parse_number(&caps[1], input)?,
                slug: None,
                episode: Some(parse_number(&caps[2], input)?),
            });
        }

        if let Some(caps) = TITLE_URL_REGEX
            .captures(input)
            .or_else(|| SLUG_REF_REGEX.captures(input))
        {
            let episode = capture_group_1(&EPISODE_PARAM_REGEX, input)
                .map(|ep| parse_number(ep, input))
                .transpose()?;
            return Ok(Self::Content {
                id: parse_number(&caps[1], input)?,
                slug: Some(caps[2].to_string()),
                episode,
            });
        }

        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Self::content(parse_number(input, input)?));
        }

        Url::parse(input)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(Self::url)
            .ok_or_else(|| ReferenceError::Unrecognized(input.to_string()))
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Content { id, .. } => Some(*id),
            Self::Url { .. } => None,
        }
    }

    pub fn slug(&self) -> Option<&str> {
        match self {
            Self::Content { slug, .. } => slug.as_deref(),
            Self::Url { .. } => None,
        }
    }

    pub fn episode(&self) -> Option<u64> {
        match self {
            Self::Content { episode, .. } => *episode,
            Self::Url { .. } => None,
        }
    }
}

fn parse_number(digits: &str, input: &str) -> Result<u64, ReferenceError> {
    digits
        .parse()
        .map_err(|_| ReferenceError::Unrecognized(input.to_string()))
}

impl fmt::Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url { url } => write!(f, "{url}"),
            Self::Content { id, slug, episode } => {
                write!(f, "{id}")?;
                if let Some(slug) = slug {
                    write!(f, "-{slug}")?;
                }
                if let Some(episode) = episode {
                    write!(f, "#e{episode}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slug_reference() {
        assert_eq!(
            PageReference::parse("1234-some-show").unwrap(),
            PageReference::content(1234).with_slug("some-show")
        );
    }

    #[test]
    fn parses_title_url() {
        let parsed =
            PageReference::parse("https://site.example/it/titles/77-a-title?episode_id=901").unwrap();
        assert_eq!(
            parsed,
            PageReference::content(77)
                .with_slug("a-title")
                .with_episode(901)
        );
    }

    #[test]
    fn parses_watch_url() {
        let parsed = PageReference::parse("https://site.example/watch/55?e=12").unwrap();
        assert_eq!(parsed, PageReference::content(55).with_episode(12));
    }

    #[test]
    fn falls_back_to_plain_url() {
        let parsed = PageReference::parse("https://player.example/embed/abc").unwrap();
        assert!(matches!(parsed, PageReference::Url { .. }));
        assert_eq!(parsed.id(), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(PageReference::parse("not a reference").is_err());
        assert!(PageReference::parse("ftp://host/file").is_err());
    }
}
