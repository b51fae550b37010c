//! Result artifact resolution
//!
//! Prefers an explicit raw-output/download link fetched over plain HTTP.
//! Falls back to inline preformatted text, but only when it is long enough
//! to be a real report rather than an empty or error placeholder.

use crate::error::{ClientError, SessionError};
use crate::session::{InteractiveSession, Locator};
use reqwest::Url;
use std::time::Duration;
use tracing::{info, warn};

/// Link labels identifying the downloadable output
pub const DOWNLOAD_LABELS: &[&str] = &["Raw Output", "Download"];

/// Minimum trimmed length for inline text to count as a report
pub const MIN_INLINE_LEN: usize = 100;

/// Where the artifact text came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Fetched from this URL
    Link(String),
    /// Read from inline preformatted text
    Inline,
}

/// Resolve a relative link against the service base URL
pub fn resolve_link(base_url: &str, href: &str) -> Result<Url, ClientError> {
    let base = Url::parse(base_url)
        .map_err(|e| SessionError::Fetch(format!("Bad base URL {}: {}", base_url, e)))?;
    base.join(href)
        .map_err(|e| ClientError::from(SessionError::Fetch(format!("Bad link {}: {}", href, e))))
}

/// Resolve the result artifact text
pub async fn resolve<S>(
    session: &mut S,
    base_url: &str,
    fetch_timeout: Duration,
) -> Result<(String, ArtifactSource), ClientError>
where
    S: InteractiveSession + ?Sized,
{
    if let Some(href) = session.link_href(DOWNLOAD_LABELS).await? {
        let url = resolve_link(base_url, &href)?;
        info!("Downloading data from: {}", url);
        let text = session.fetch(url.as_str(), fetch_timeout).await?;
        return Ok((text, ArtifactSource::Link(url.to_string())));
    }

    match session.rendered_text(&Locator::css("pre")).await? {
        Some(text) if text.trim().len() > MIN_INLINE_LEN => Ok((text, ArtifactSource::Inline)),
        Some(text) => {
            warn!(
                length = text.trim().len(),
                "Inline result text too short to be a report"
            );
            Err(ClientError::NoContent)
        }
        None => Err(ClientError::NoContent),
    }
}
