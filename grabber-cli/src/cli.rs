use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use playlist::VariantSelection;

use crate::error::AppError;

#[derive(Parser, Debug)]
#[command(name = "grabber")]
#[command(about = "Resolve content pages to HLS manifests and download them")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Proxy URL for every request (http, https or socks5)
    #[arg(long, global = true, env = "GRABBER_PROXY")]
    pub proxy: Option<String>,

    /// Override the User-Agent header
    #[arg(long, global = true)]
    pub user_agent: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Locate the manifest behind a content page
    Resolve {
        /// Content reference: `<id>`, `<id>-<slug>`, a title/watch URL or any page URL
        reference: String,

        #[command(flatten)]
        site: SiteArgs,

        /// Page request timeout in seconds
        #[arg(long, default_value = "20")]
        timeout: u64,
    },

    /// Download a page, playlist or file to a single output file
    Download {
        /// Playlist or file URL; a content reference when `--base` is given
        source: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        site: SiteArgs,

        /// Segments fetched at once
        #[arg(short, long, default_value = "4")]
        concurrency: usize,

        /// Attempts per segment, the first one included
        #[arg(short, long, default_value = "3")]
        retries: u32,

        /// Per-attempt segment timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Extra request header, `Name: value` or `name=value`. Repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Keep the partial file on failure and continue it on the next run
        #[arg(long)]
        resumable: bool,

        /// Variant picked from a master playlist
        #[arg(long, value_enum, default_value_t = Quality::Best)]
        quality: Quality,

        /// Decrypt segments on the blocking thread pool
        #[arg(long)]
        offload_decryption: bool,
    },
}

/// Where content references are resolved.
#[derive(clap::Args, Debug, Clone)]
pub struct SiteArgs {
    /// Base URL of the site serving the content pages
    #[arg(long)]
    pub base: Option<String>,

    /// Path suffix identifying manifest URLs
    #[arg(long, default_value = ".m3u8")]
    pub manifest_suffix: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    Worst,
}

impl From<Quality> for VariantSelection {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Best => VariantSelection::HighestBitrate,
            Quality::Worst => VariantSelection::LowestBitrate,
        }
    }
}

/// Parses `Name: value` or `name=value` header arguments.
pub fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>, AppError> {
    raw.iter()
        .map(|header| {
            header
                .split_once(':')
                .or_else(|| header.split_once('='))
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| AppError::InvalidInput(format!("Invalid header format: {header}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_header_forms() {
        let headers = parse_headers(&[
            "Referer: https://site.example/watch/1".to_string(),
            "x-token=abc".to_string(),
        ])
        .unwrap();
        assert_eq!(
            headers,
            vec![
                ("Referer".to_string(), "https://site.example/watch/1".to_string()),
                ("x-token".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_headers_without_separator() {
        assert!(parse_headers(&["no-separator".to_string()]).is_err());
        assert!(parse_headers(&[": value".to_string()]).is_err());
    }

    #[test]
    fn download_arguments() {
        let args = Args::try_parse_from([
            "grabber",
            "download",
            "https://cdn.example/master.m3u8",
            "-o",
            "out.ts",
            "-c",
            "8",
            "-H",
            "Referer: https://site.example/",
            "--resumable",
        ])
        .unwrap();
        match args.command {
            Commands::Download {
                source,
                output,
                concurrency,
                headers,
                resumable,
                quality,
                site,
                ..
            } => {
                assert_eq!(source, "https://cdn.example/master.m3u8");
                assert_eq!(output, PathBuf::from("out.ts"));
                assert_eq!(concurrency, 8);
                assert_eq!(headers.len(), 1);
                assert!(resumable);
                assert_eq!(quality, Quality::Best);
                assert!(site.base.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["grabber", "-v", "-q", "resolve", "12"]).is_err());
    }
}
