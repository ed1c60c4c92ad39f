//! The four extraction strategies, in the order the pipeline runs them.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::decode::ScriptDecoder;
use crate::error::TransportError;
use crate::fetch::{PageFetcher, PageRequest, PageResponse};
use crate::layout::SiteLayout;
use crate::reference::PageReference;
use crate::scan::{ManifestScanner, find_iframe_src, join_reference, scripts_with_markers};

/// State shared by the strategies of one resolution.
pub struct ResolveContext<'a> {
    pub reference: &'a PageReference,
    pub layout: &'a SiteLayout,
    pub scanner: &'a ManifestScanner,
    fetcher: &'a dyn PageFetcher,
    decoder: &'a dyn ScriptDecoder,
    last_page: Option<PageResponse>,
    successful_fetches: usize,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        reference: &'a PageReference,
        layout: &'a SiteLayout,
        scanner: &'a ManifestScanner,
        fetcher: &'a dyn PageFetcher,
        decoder: &'a dyn ScriptDecoder,
    ) -> Self {
        Self {
            reference,
            layout,
            scanner,
            fetcher,
            decoder,
            last_page: None,
            successful_fetches: 0,
        }
    }

    /// Fetches a page and remembers it as the most recent body.
    pub async fn fetch(&mut self, request: PageRequest) -> Result<PageResponse, TransportError> {
        trace!(url = %request.url, "strategy fetch");
        let page = self.fetcher.fetch(request).await?;
        self.successful_fetches += 1;
        self.last_page = Some(page.clone());
        Ok(page)
    }

    /// Most recently fetched body across all strategies so far.
    pub fn last_page(&self) -> Option<&PageResponse> {
        self.last_page.as_ref()
    }

    pub fn successful_fetches(&self) -> usize {
        self.successful_fetches
    }

    /// Referer used for requests made on behalf of the reference: the watch
    /// page when one can be built, else the page URL itself, else the site base.
    pub fn referer(&self) -> String {
        self.layout
            .watch_url(self.reference)
            .or_else(|| match self.reference {
                PageReference::Url { url } => Some(url.clone()),
                PageReference::Content { .. } => None,
            })
            .unwrap_or_else(|| self.layout.base.clone())
            .to_string()
    }

    /// Raw pattern scan first, then every inline script carrying a marker is
    /// handed to the decoder.
    async fn scan_or_decode(&self, page: &PageResponse) -> Option<Url> {
        if let Some(url) = self.scanner.find(&page.body) {
            return Some(url);
        }
        for script in scripts_with_markers(&page.body, &self.layout.script_markers) {
            match self.decoder.decode(script, &page.url).await {
                Ok(Some(candidate)) => {
                    if let Some(url) = join_reference(&page.url, &candidate) {
                        return Some(url);
                    }
                    debug!(candidate = %candidate, "decoder returned an unusable URL");
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, page = %page.url, "script decoding failed"),
            }
        }
        None
    }
}

/// One fallback method for locating a manifest.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when nothing was found; `Err` only for failed fetches.
    async fn attempt(&self, ctx: &mut ResolveContext<'_>) -> Result<Option<Url>, TransportError>;
}

/// Fetches the player page, follows its iframe and inspects what the player serves.
pub struct EmbeddedPlayerStrategy;

#[async_trait]
impl ExtractionStrategy for EmbeddedPlayerStrategy {
    fn name(&self) -> &'static str {
        "embedded-player"
    }

    async fn attempt(&self, ctx: &mut ResolveContext<'_>) -> Result<Option<Url>, TransportError> {
        let Some(page_url) = ctx.layout.player_url(ctx.reference) else {
            return Ok(None);
        };
        let request = PageRequest::get(page_url).with_referer(ctx.layout.base.as_str());
        let page = ctx.fetch(request).await?;

        let player = match find_iframe_src(&page.body).and_then(|src| join_reference(&page.url, src)) {
            Some(iframe_url) => {
                debug!(iframe = %iframe_url, "following player iframe");
                let request = PageRequest::get(iframe_url).with_referer(page.url.as_str());
                ctx.fetch(request).await?
            }
            None => page,
        };

        Ok(ctx.scan_or_decode(&player).await)
    }
}

/// Asks the site's dedicated endpoint, which answers with the manifest or
/// with the URL of the player embed.
pub struct DedicatedEndpointStrategy;

#[async_trait]
impl ExtractionStrategy for DedicatedEndpointStrategy {
    fn name(&self) -> &'static str {
        "dedicated-endpoint"
    }

    async fn attempt(&self, ctx: &mut ResolveContext<'_>) -> Result<Option<Url>, TransportError> {
        let Some(endpoint) = ctx.layout.endpoint_url(ctx.reference) else {
            return Ok(None);
        };
        let referer = ctx.referer();
        let response = ctx
            .fetch(PageRequest::get(endpoint).with_referer(referer.as_str()))
            .await?;

        if playlist::looks_like_playlist(&response.body) {
            return Ok(Some(response.url));
        }
        if let Some(url) = ctx.scanner.find(&response.body) {
            return Ok(Some(url));
        }

        let Some(embed_url) = embed_target(&response) else {
            return Ok(None);
        };
        debug!(embed = %embed_url, "endpoint answered with an embed URL");
        let request = PageRequest::get(embed_url)
            .with_referer(referer)
            .with_origin(ctx.layout.origin());
        let embed = ctx.fetch(request).await?;

        if playlist::looks_like_playlist(&embed.body) {
            return Ok(Some(embed.url));
        }
        Ok(ctx.scan_or_decode(&embed).await)
    }
}

/// The URL an endpoint body points at: either the bare body or the first
/// http(s) string inside a JSON answer.
fn embed_target(response: &PageResponse) -> Option<Url> {
    let body = response.body.trim();
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        return first_url_in_json(&json);
    }
    if body.lines().count() == 1 && (body.starts_with("http") || body.starts_with('/')) {
        return join_reference(&response.url, body).filter(|u| u.scheme().starts_with("http"));
    }
    None
}

fn first_url_in_json(value: &Value) -> Option<Url> {
    match value {
        Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
            Url::parse(s).ok()
        }
        Value::Array(items) => items.iter().find_map(first_url_in_json),
        Value::Object(map) => map.values().find_map(first_url_in_json),
        _ => None,
    }
}

/// Scans whatever body was fetched last, without fetching anything itself.
pub struct PatternScanStrategy;

#[async_trait]
impl ExtractionStrategy for PatternScanStrategy {
    fn name(&self) -> &'static str {
        "pattern-scan"
    }

    async fn attempt(&self, ctx: &mut ResolveContext<'_>) -> Result<Option<Url>, TransportError> {
        Ok(ctx
            .last_page()
            .and_then(|page| ctx.scanner.find_loose(&page.body)))
    }
}

/// Last resort: the playback page built from the same identifier.
pub struct SecondaryPageStrategy;

#[async_trait]
impl ExtractionStrategy for SecondaryPageStrategy {
    fn name(&self) -> &'static str {
        "secondary-page"
    }

    async fn attempt(&self, ctx: &mut ResolveContext<'_>) -> Result<Option<Url>, TransportError> {
        let Some(watch_url) = ctx.layout.watch_url(ctx.reference) else {
            return Ok(None);
        };
        let request = PageRequest::get(watch_url).with_referer(ctx.layout.base.as_str());
        let page = ctx.fetch(request).await?;
        Ok(ctx.scanner.find_loose(&page.body))
    }
}

/// The default strategy order.
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(EmbeddedPlayerStrategy),
        Box::new(DedicatedEndpointStrategy),
        Box::new(PatternScanStrategy),
        Box::new(SecondaryPageStrategy),
    ]
}
