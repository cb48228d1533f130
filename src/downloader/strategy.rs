//! Host classification and pipeline selection
//!
//! Two disjoint host tables encode what we know about a site:
//! - standard: the extractor handles fetch + merge on its own
//! - streaming: token-protected HLS that has to go through URL resolution
//!   and the transcoder
//!
//! For those hosts the classification overrides the caller's choice. Hosts in
//! neither table are `Unknown` and the caller decides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Always fetched by the standard pipeline
pub const STANDARD_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "youtube-nocookie.com",
    "tiktok.com",
    "instagram.com",
    "facebook.com",
    "fb.watch",
    "twitter.com",
    "x.com",
    "vimeo.com",
    "dailymotion.com",
    "reddit.com",
    "twitch.tv",
    "soundcloud.com",
];

/// Always fetched by the advanced pipeline
pub const STREAMING_HOSTS: &[&str] = &[
    "xhamster.com",
    "xhamster.desi",
    "pornhub.com",
    "xvideos.com",
    "xnxx.com",
    "spankbang.com",
    "eporner.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostClass {
    Standard,
    Streaming,
    Unknown,
}

/// Which acquisition pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Standard,
    Advanced,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown pipeline mode: {}", other)),
        }
    }
}

/// A URL together with its host classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    url: String,
    host: Option<String>,
    class: HostClass,
}

impl MediaTarget {
    pub fn new(url: &str) -> Self {
        let host = host_of(url);
        let class = host.as_deref().map(classify_host).unwrap_or(HostClass::Unknown);
        Self {
            url: url.to_string(),
            host,
            class,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hostname without a leading `www.`
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn class(&self) -> HostClass {
        self.class
    }

    /// Pick the pipeline: known hosts are authoritative, unknown hosts
    /// honour `requested` and default to standard.
    pub fn pipeline_mode(&self, requested: Option<PipelineMode>) -> PipelineMode {
        match self.class {
            HostClass::Standard => PipelineMode::Standard,
            HostClass::Streaming => PipelineMode::Advanced,
            HostClass::Unknown => requested.unwrap_or_default(),
        }
    }
}

/// Lowercased hostname with any leading `www.` removed
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (!host.is_empty()).then_some(host)
}

/// True when `host` equals `domain` or is one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub fn classify_host(host: &str) -> HostClass {
    if STANDARD_HOSTS.iter().any(|d| host_matches(host, d)) {
        HostClass::Standard
    } else if STREAMING_HOSTS.iter().any(|d| host_matches(host, d)) {
        HostClass::Streaming
    } else {
        HostClass::Unknown
    }
}
