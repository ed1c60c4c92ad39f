//! Locates the HLS manifest behind a content page.
//!
//! A [`PageReference`] is run through an [`ExtractionPipeline`] of ordered
//! fallback strategies. Each strategy either yields a manifest URL or hands
//! over to the next one, and every attempt is recorded in a
//! [`ResolutionTrace`]. Network access goes through the [`PageFetcher`]
//! capability so the pipeline can be driven by any client.

pub mod decode;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod pipeline;
pub mod reference;
pub mod scan;
pub mod strategy;
pub mod trace;

pub use decode::{PatternScriptDecoder, ScriptDecoder};
pub use error::{DecodeError, ReferenceError, ResolutionError, TransportError};
pub use fetch::{HttpPageFetcher, PageFetcher, PageRequest, PageResponse};
pub use layout::SiteLayout;
pub use pipeline::{ExtractionPipeline, Resolution, Resolver, resolve};
pub use reference::PageReference;
pub use scan::ManifestScanner;
pub use strategy::{
    DedicatedEndpointStrategy, EmbeddedPlayerStrategy, ExtractionStrategy, PatternScanStrategy,
    ResolveContext, SecondaryPageStrategy, default_strategies,
};
pub use trace::{AttemptOutcome, ExtractionAttempt, ResolutionTrace};
