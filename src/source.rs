use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

pub const SOURCE_HOST: &str = "archiveofourown.org";
pub const DEFAULT_SOURCE_BASE_URL: &str = "https://archiveofourown.org";

static WORK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/works/(\d+)").unwrap_or_else(|err| panic!("invalid work id regex: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid url {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("unsupported host {host:?}: only archiveofourown.org works are supported")]
    UnsupportedHost { host: String },

    #[error("could not find a work id in {input:?}")]
    MissingWorkId { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkId(String);

impl WorkId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full-work view of the work under `base_url`, with the adult-content
    /// interstitial skipped.
    pub fn fetch_url(&self, base_url: &str) -> String {
        let base_url = base_url.trim_end_matches('/');
        format!(
            "{base_url}/works/{}?view_full_work=true&view_adult=true",
            self.0
        )
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn parse_work_url(input: &str) -> Result<WorkId, ValidationError> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|err| ValidationError::InvalidUrl {
        input: trimmed.to_owned(),
        reason: err.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidUrl {
            input: trimmed.to_owned(),
            reason: format!("scheme must be http/https, got {}", url.scheme()),
        });
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !is_supported_host(&host) {
        return Err(ValidationError::UnsupportedHost { host });
    }

    work_id_from_path(url.path()).ok_or_else(|| ValidationError::MissingWorkId {
        input: trimmed.to_owned(),
    })
}

pub fn is_supported_url(input: &str) -> bool {
    let Ok(url) = Url::parse(input.trim()) else {
        return false;
    };
    (url.scheme() == "http" || url.scheme() == "https")
        && url
            .host_str()
            .is_some_and(|host| is_supported_host(&host.to_ascii_lowercase()))
}

fn is_supported_host(host: &str) -> bool {
    host == SOURCE_HOST
        || host
            .strip_suffix(SOURCE_HOST)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn work_id_from_path(path: &str) -> Option<WorkId> {
    let caps = WORK_ID_RE.captures(path)?;
    Some(WorkId(caps.get(1)?.as_str().to_owned()))
}
