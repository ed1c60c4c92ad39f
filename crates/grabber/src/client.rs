use reqwest::Client;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::DownloadError;

/// Builds the `reqwest` client behind [`HttpTransport`](crate::transport::HttpTransport).
///
/// Per-request timeouts are applied by the callers, so the client itself
/// only carries the connect timeout.
pub fn create_client(config: &ClientConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.pool_idle_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.pool_idle_timeout);
    }

    if config.accept_invalid_certs {
        client_builder = client_builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| DownloadError::client(format!("invalid proxy {proxy_url}: {e}")))?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_url, "Using configured proxy for downloads");
    } else {
        debug!("No proxy configured for downloads");
    }

    client_builder
        .build()
        .map_err(|e| DownloadError::client(e.to_string()))
}
