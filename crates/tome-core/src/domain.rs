//! Registrable-domain normalization.
//!
//! Reduces URLs and bare hosts to the public-suffix-aware registrable
//! domain so that `https://www.example.com:443/x`, `EXAMPLE.com` and
//! `docs.example.com` all compare equal, while `example.co.uk` keeps its
//! two-label suffix.

use std::net::IpAddr;

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid domain or URL '{0}'")]
    Invalid(String),
}

/// Normalize a URL or bare domain to its lower-cased registrable domain.
///
/// IP addresses and hosts without a public suffix (e.g. `localhost`)
/// normalize to themselves.
///
/// ```rust
/// use tome_core::domain::normalize;
///
/// assert_eq!(normalize("https://www.example.com:443/x").unwrap(), "example.com");
/// assert_eq!(normalize("EXAMPLE.com").unwrap(), "example.com");
/// assert_eq!(normalize("docs.example.co.uk").unwrap(), "example.co.uk");
/// ```
pub fn normalize(input: &str) -> Result<String, DomainError> {
    let host = host_of(input)?;
    match host {
        Host::Ipv4(ip) => Ok(ip.to_string()),
        Host::Ipv6(ip) => Ok(ip.to_string()),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            if name.is_empty() {
                return Err(DomainError::Invalid(input.to_string()));
            }
            Ok(psl::domain_str(&name).unwrap_or(&name).to_string())
        }
    }
}

/// True when both inputs normalize to the same registrable domain.
pub fn same_domain(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Parse `input` as a URL, or as a bare `host[:port][/path]` when it has no scheme.
pub fn parse_loose(input: &str) -> Result<Url, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Invalid(input.to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&candidate).map_err(|_| DomainError::Invalid(input.to_string()))?;
    if url.host().is_none() {
        return Err(DomainError::Invalid(input.to_string()));
    }
    Ok(url)
}

fn host_of(input: &str) -> Result<Host<String>, DomainError> {
    if let Ok(ip) = input.trim().parse::<IpAddr>() {
        return Ok(match ip {
            IpAddr::V4(v4) => Host::Ipv4(v4),
            IpAddr::V6(v6) => Host::Ipv6(v6),
        });
    }
    let url = parse_loose(input)?;
    url.host()
        .map(|h| h.to_owned())
        .ok_or_else(|| DomainError::Invalid(input.to_string()))
}
