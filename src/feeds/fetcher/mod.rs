//! Source fetchers.
//!
//! A [`Fetcher`] turns one source into a finite list of normalized items.
//! There is one implementation per protocol; [`FetcherFactory`] picks it
//! from the source's `api_type`.

mod rss;

pub use rss::{normalize_entry, parse_entries, RssFetcher};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::FetchConfig;
use crate::feeds::types::{ApiType, FetchOutcome, Source};
use crate::{Result, VaultError};

/// Produces normalized items from a single source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Protocol handled by this fetcher.
    fn api_type(&self) -> ApiType;

    /// Retrieve and normalize the source's current entries.
    ///
    /// Fails only at the transport level; per-entry defects degrade fields.
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome>;
}

/// Maps a source to the fetcher for its protocol.
pub trait FetcherResolver: Send + Sync {
    /// Fetcher for `source`, or [`VaultError::UnsupportedProtocol`].
    fn resolve(&self, source: &Source) -> Result<Arc<dyn Fetcher>>;
}

impl<T: FetcherResolver + ?Sized> FetcherResolver for Arc<T> {
    fn resolve(&self, source: &Source) -> Result<Arc<dyn Fetcher>> {
        (**self).resolve(source)
    }
}

/// Resolver over the built-in fetchers, sharing one HTTP client.
pub struct FetcherFactory {
    rss: Arc<dyn Fetcher>,
}

impl FetcherFactory {
    /// Build the HTTP client and fetchers from `config`.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self {
            rss: Arc::new(RssFetcher::new(client, config.clone())),
        })
    }
}

impl FetcherResolver for FetcherFactory {
    fn resolve(&self, source: &Source) -> Result<Arc<dyn Fetcher>> {
        match source.api_type {
            ApiType::Rss => Ok(Arc::clone(&self.rss)),
            // TODO: REST polling needs a per-source field mapping in `Source::config`
            other @ (ApiType::Rest | ApiType::Youtube | ApiType::Twitter) => {
                Err(VaultError::UnsupportedProtocol(other))
            }
        }
    }
}

/// Build the shared HTTP client: timeouts, redirect limit and user agent.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
        .timeout(Duration::from_secs(config.total_timeout_secs))
        .redirect(redirect_policy(
            config.max_redirects,
            config.allow_private_hosts,
        ))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| VaultError::Config(format!("failed to create HTTP client: {e}")))
}

/// Follow at most `max_redirects` hops, each to an endpoint that passes
/// [`validate_endpoint`].
fn redirect_policy(max_redirects: usize, allow_private: bool) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        match check_redirect(
            attempt.url(),
            attempt.previous().len(),
            max_redirects,
            allow_private,
        ) {
            Ok(()) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

/// `hops` counts the URLs already requested in the chain.
fn check_redirect(
    target: &url::Url,
    hops: usize,
    max_redirects: usize,
    allow_private: bool,
) -> Result<()> {
    if hops > max_redirects {
        return Err(VaultError::Transport(format!(
            "too many redirects (max {max_redirects})"
        )));
    }
    validate_endpoint(target.as_str(), allow_private).map(|_| ())
}

/// Check that an endpoint is an http(s) URL on a public host.
///
/// Loopback, private, link-local and internal hostnames are refused unless
/// `allow_private` is set.
pub fn validate_endpoint(endpoint: &str, allow_private: bool) -> Result<url::Url> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| VaultError::Validation(format!("invalid endpoint {endpoint:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(VaultError::Validation(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host()
        .ok_or_else(|| VaultError::Validation("endpoint has no host".to_string()))?;

    if allow_private {
        return Ok(parsed);
    }

    let refused = match host {
        url::Host::Domain(domain) => is_internal_hostname(domain),
        url::Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(ip)),
        url::Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(ip)),
    };
    if refused {
        return Err(VaultError::Validation(format!(
            "endpoint host is not public: {host}"
        )));
    }

    Ok(parsed)
}

fn is_internal_hostname(host: &str) -> bool {
    const INTERNAL_SUFFIXES: &[&str] = &[".local", ".localhost", ".internal", ".lan", ".home"];

    let host = host.to_lowercase();
    host == "localhost" || INTERNAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, _, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                // carrier-grade NAT, 100.64.0.0/10
                || (a == 100 && (64..=127).contains(&b))
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}
