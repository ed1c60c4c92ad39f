use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::decode::{PatternScriptDecoder, ScriptDecoder};
use crate::error::{ResolutionError, TransportError};
use crate::fetch::PageFetcher;
use crate::layout::SiteLayout;
use crate::reference::PageReference;
use crate::scan::ManifestScanner;
use crate::strategy::{ExtractionStrategy, ResolveContext, default_strategies};
use crate::trace::{AttemptOutcome, ResolutionTrace};

/// A manifest URL together with how it was found.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub manifest_url: Url,
    pub trace: ResolutionTrace,
    /// Referer the manifest host expects, when the site requires one.
    pub referer: Option<String>,
    /// Origin of the site the reference belongs to.
    pub origin: String,
}

/// Strategies tried in order until one yields a manifest URL.
pub struct ExtractionPipeline {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }
}

impl ExtractionPipeline {
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the strategies against `reference`.
    ///
    /// Each strategy contributes exactly one trace entry. A transport failure
    /// in one strategy never stops the next one from running.
    pub async fn run(
        &self,
        reference: &PageReference,
        layout: &SiteLayout,
        fetcher: &dyn PageFetcher,
        decoder: &dyn ScriptDecoder,
    ) -> Result<Resolution, ResolutionError> {
        let scanner = ManifestScanner::new(&layout.manifest_suffix);
        let mut ctx = ResolveContext::new(reference, layout, &scanner, fetcher, decoder);
        let mut trace = ResolutionTrace::new();
        let mut last_failure: Option<(&'static str, TransportError)> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.attempt(&mut ctx).await {
                Ok(Some(url)) => {
                    info!(strategy = name, url = %url, "manifest located");
                    trace.push(
                        name,
                        AttemptOutcome::Found {
                            url: url.to_string(),
                        },
                    );
                    return Ok(Resolution {
                        manifest_url: url,
                        trace,
                        referer: Some(ctx.referer()),
                        origin: layout.origin(),
                    });
                }
                Ok(None) => {
                    debug!(strategy = name, "no manifest");
                    trace.push(name, AttemptOutcome::NoMatch);
                }
                Err(e) => {
                    warn!(strategy = name, error = %e, "strategy fetch failed");
                    trace.push(
                        name,
                        AttemptOutcome::Transport {
                            cause: e.to_string(),
                        },
                    );
                    last_failure = Some((name, e));
                }
            }
        }

        match last_failure {
            Some((strategy, cause)) if ctx.successful_fetches() == 0 => {
                Err(ResolutionError::TransportFailure {
                    strategy,
                    cause,
                    trace,
                })
            }
            _ => Err(ResolutionError::NotFound { trace }),
        }
    }
}

/// Pipeline bound to one site and one network capability.
pub struct Resolver {
    pipeline: ExtractionPipeline,
    fetcher: Arc<dyn PageFetcher>,
    decoder: Arc<dyn ScriptDecoder>,
    layout: SiteLayout,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, layout: SiteLayout) -> Self {
        let decoder = PatternScriptDecoder::new(ManifestScanner::new(&layout.manifest_suffix));
        Self {
            pipeline: ExtractionPipeline::default(),
            fetcher,
            decoder: Arc::new(decoder),
            layout,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ScriptDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_pipeline(mut self, pipeline: ExtractionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub async fn resolve(&self, reference: &PageReference) -> Result<Resolution, ResolutionError> {
        self.pipeline
            .run(
                reference,
                &self.layout,
                self.fetcher.as_ref(),
                self.decoder.as_ref(),
            )
            .await
    }
}

/// Resolves `reference` with the default strategy order.
pub async fn resolve(
    reference: &PageReference,
    fetcher: &dyn PageFetcher,
    decoder: &dyn ScriptDecoder,
    layout: &SiteLayout,
) -> Result<Resolution, ResolutionError> {
    ExtractionPipeline::default()
        .run(reference, layout, fetcher, decoder)
        .await
}
