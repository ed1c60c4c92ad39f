use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use grabber_engine::client::create_client;
use grabber_engine::{
    ClientConfig, DownloadOptions, DownloadSession, DownloadSource, SessionEvent,
};
use serde_json::json;
use stream_resolver::{HttpPageFetcher, PageReference, Resolver, SiteLayout};
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::{Quality, SiteArgs, parse_headers};
use crate::error::AppError;

/// Exit status of a download stopped by the user.
const EXIT_INTERRUPTED: u8 = 130;

pub struct DownloadArgs {
    pub source: String,
    pub output: PathBuf,
    pub site: SiteArgs,
    pub concurrency: usize,
    pub retries: u32,
    pub timeout: u64,
    pub headers: Vec<String>,
    pub resumable: bool,
    pub quality: Quality,
    pub offload_decryption: bool,
}

/// Builds the command handlers from the global flags.
pub struct CommandExecutor {
    client_config: ClientConfig,
}

impl CommandExecutor {
    pub fn new(proxy: Option<String>, user_agent: Option<String>) -> Self {
        let mut client_config = ClientConfig::default();
        if let Some(proxy) = proxy {
            client_config = client_config.with_proxy(proxy);
        }
        if let Some(user_agent) = user_agent {
            client_config = client_config.with_user_agent(user_agent);
        }
        Self { client_config }
    }

    fn resolver(&self, layout: SiteLayout, timeout: Duration) -> anyhow::Result<Resolver> {
        let client =
            create_client(&self.client_config).context("Failed to build the HTTP client")?;
        let fetcher = HttpPageFetcher::new(client).with_timeout(timeout);
        Ok(Resolver::new(Arc::new(fetcher), layout))
    }

    pub async fn resolve(
        &self,
        reference: &str,
        site: &SiteArgs,
        timeout: Duration,
    ) -> anyhow::Result<ExitCode> {
        let reference = PageReference::parse(reference).map_err(AppError::from)?;
        let layout = site_layout(site, &reference)?;
        let resolver = self.resolver(layout, timeout)?;

        match resolver.resolve(&reference).await {
            Ok(resolution) => {
                let report = json!({
                    "status": "ok",
                    "manifest_url": resolution.manifest_url.as_str(),
                    "referer": resolution.referer,
                    "origin": resolution.origin,
                    "trace": resolution.trace,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                let report = json!({
                    "status": "error",
                    "message": e.to_string(),
                    "trace": e.trace(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(ExitCode::FAILURE)
            }
        }
    }

    pub async fn download(&self, args: DownloadArgs) -> anyhow::Result<ExitCode> {
        let mut options = DownloadOptions::default()
            .with_concurrency(args.concurrency)
            .with_retries_per_segment(args.retries)
            .with_timeout_per_segment(Duration::from_secs(args.timeout))
            .with_resumable(args.resumable)
            .with_variant_selection(args.quality.into())
            .with_offload_decryption(args.offload_decryption)
            .with_client(self.client_config.clone());
        for (name, value) in parse_headers(&args.headers)? {
            options = options.with_header(name, value);
        }
        options.validate().map_err(AppError::from)?;

        let session = if args.site.base.is_some() {
            let reference = PageReference::parse(&args.source).map_err(AppError::from)?;
            let layout = site_layout(&args.site, &reference)?;
            let resolver = self.resolver(layout, Duration::from_secs(args.timeout))?;
            DownloadSession::new(DownloadSource::Page(reference), &args.output, options)
                .with_resolver(Arc::new(resolver))
        } else {
            let url = Url::parse(&args.source)
                .ok()
                .filter(|url| matches!(url.scheme(), "http" | "https"))
                .ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "{} is not an http(s) URL; pass --base to resolve content references",
                        args.source
                    ))
                })?;
            DownloadSession::new(DownloadSource::from_url(url), &args.output, options)
        };

        let running = session.on_event(log_event).start();
        let handle = running.handle.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping download");
                handle.cancel();
            }
        });

        let outcome = running.join.await.context("Download task panicked")?;
        interrupt.abort();

        println!("{}", serde_json::to_string_pretty(&outcome)?);
        Ok(if outcome.is_success() {
            ExitCode::SUCCESS
        } else if outcome.stopped {
            ExitCode::from(EXIT_INTERRUPTED)
        } else {
            ExitCode::FAILURE
        })
    }
}

/// Layout for `reference`. Plain page URLs fall back to their own origin as base.
fn site_layout(site: &SiteArgs, reference: &PageReference) -> Result<SiteLayout, AppError> {
    let base = match (&site.base, reference) {
        (Some(base), _) => Url::parse(base)
            .map_err(|e| AppError::InvalidInput(format!("Invalid base URL {base}: {e}")))?,
        (None, PageReference::Url { url }) => url.clone(),
        (None, PageReference::Content { .. }) => {
            return Err(AppError::InvalidInput(
                "--base is required to resolve content identifiers".to_string(),
            ));
        }
    };
    Ok(SiteLayout::new(base).with_manifest_suffix(site.manifest_suffix.clone()))
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { state } => debug!(%state, "Session state changed"),
        SessionEvent::Resolved {
            manifest_url,
            trace,
        } => info!(manifest_url = %manifest_url, attempts = trace.len(), "Resolved manifest"),
        SessionEvent::ManifestReady {
            segments,
            encrypted,
            resumed_from,
        } => info!(segments, encrypted, resumed_from, "Manifest ready"),
        SessionEvent::SegmentWritten {
            index,
            segments_done,
            total_segments,
            ..
        } => debug!(index, "Segment {segments_done}/{total_segments} written"),
        SessionEvent::SegmentFailed { index, error } => {
            warn!(index, error = %error, "Segment failed")
        }
        SessionEvent::Finished { state } => info!(%state, "Session finished"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(base: Option<&str>) -> SiteArgs {
        SiteArgs {
            base: base.map(str::to_string),
            manifest_suffix: ".m3u8".to_string(),
        }
    }

    #[test]
    fn content_reference_needs_a_base() {
        let err = site_layout(&site(None), &PageReference::content(12)).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let layout = site_layout(&site(Some("https://site.example")), &PageReference::content(12))
            .unwrap();
        assert_eq!(layout.origin(), "https://site.example");
    }

    #[test]
    fn page_url_falls_back_to_its_origin() {
        let reference = PageReference::parse("https://player.example/embed/9").unwrap();
        let layout = site_layout(&site(None), &reference).unwrap();
        assert_eq!(layout.origin(), "https://player.example");
    }
}
