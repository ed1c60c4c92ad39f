use serde::{Deserialize, Serialize};
use url::Url;

use crate::reference::PageReference;

/// URL shapes of one site.
///
/// Templates may use `{base}`, `{id}`, `{slug}` and `{episode}`. A template
/// whose placeholders the reference cannot fill produces no URL, and the
/// strategy depending on it reports no match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLayout {
    pub base: Url,
    /// Page embedding the player (embedded-player strategy).
    #[serde(default = "default_player_page")]
    pub player_page: String,
    /// Endpoint answering with the manifest or the embed URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Playback page scanned last.
    #[serde(default = "default_watch_page")]
    pub watch_page: String,
    /// Path suffix of manifest URLs.
    #[serde(default = "default_manifest_suffix")]
    pub manifest_suffix: String,
    /// Inline scripts containing any of these are handed to the script decoder.
    #[serde(default = "default_script_markers")]
    pub script_markers: Vec<String>,
}

fn default_player_page() -> String {
    "{base}/iframe/{id}?episode_id={episode}".to_string()
}

fn default_endpoint() -> String {
    "{base}/embed-url/{episode}".to_string()
}

fn default_watch_page() -> String {
    "{base}/watch/{id}?e={episode}".to_string()
}

fn default_manifest_suffix() -> String {
    ".m3u8".to_string()
}

fn default_script_markers() -> Vec<String> {
    vec!["masterPlaylist".to_string(), "video".to_string()]
}

impl SiteLayout {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            player_page: default_player_page(),
            endpoint: default_endpoint(),
            watch_page: default_watch_page(),
            manifest_suffix: default_manifest_suffix(),
            script_markers: default_script_markers(),
        }
    }

    pub fn with_player_page(mut self, template: impl Into<String>) -> Self {
        self.player_page = template.into();
        self
    }

    pub fn with_endpoint(mut self, template: impl Into<String>) -> Self {
        self.endpoint = template.into();
        self
    }

    pub fn with_watch_page(mut self, template: impl Into<String>) -> Self {
        self.watch_page = template.into();
        self
    }

    pub fn with_manifest_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.manifest_suffix = suffix.into();
        self
    }

    pub fn with_script_markers(mut self, markers: Vec<String>) -> Self {
        self.script_markers = markers;
        self
    }

    pub fn player_url(&self, reference: &PageReference) -> Option<Url> {
        match reference {
            PageReference::Url { url } => Some(url.clone()),
            PageReference::Content { .. } => self.render(&self.player_page, reference),
        }
    }

    pub fn endpoint_url(&self, reference: &PageReference) -> Option<Url> {
        self.render(&self.endpoint, reference)
    }

    pub fn watch_url(&self, reference: &PageReference) -> Option<Url> {
        self.render(&self.watch_page, reference)
    }

    /// `scheme://host[:port]` of the base URL, for `Origin` headers.
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    fn render(&self, template: &str, reference: &PageReference) -> Option<Url> {
        if template.is_empty() {
            return None;
        }
        let PageReference::Content { id, slug, episode } = reference else {
            return None;
        };

        let base = self.base.as_str().trim_end_matches('/');
        let mut rendered = template.replace("{base}", base).replace("{id}", &id.to_string());
        if rendered.contains("{slug}") {
            rendered = rendered.replace("{slug}", slug.as_deref()?);
        }
        if rendered.contains("{episode}") {
            rendered = rendered.replace("{episode}", &(*episode)?.to_string());
        }
        Url::parse(&rendered).ok()
    }
}
