//! Presentation-neutral helpers derived from profile data
//!
//! - Display name fallback chain for public profiles
//! - URL extraction from free-form social link text

use crate::types::PublicProfile;
use once_cell::sync::Lazy;
use regex::Regex;

/// Fallback shown when a profile has neither display name nor company
pub const DEFAULT_DISPLAY_NAME: &str = "Community Member";

static HTTP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)https?://(?P<authority>[^/\s?#]+)(?:[/?#]\S*)?$")
        .unwrap_or_else(|e| unreachable!("static regex is valid: {e}"))
});

static TOKEN_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s,]+").unwrap_or_else(|e| unreachable!("static regex is valid: {e}")));

fn non_blank(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

impl PublicProfile {
    /// Best name for display: display name, then company, then `fallback`
    #[must_use]
    pub fn display_name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        non_blank(&self.display_name)
            .or_else(|| non_blank(&self.company_name))
            .unwrap_or(fallback)
    }

    /// Best name for display with the default fallback
    #[inline]
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.display_name_or(DEFAULT_DISPLAY_NAME)
    }

    /// Uppercased first letter of the display name, `?` when unnamed
    #[must_use]
    pub fn initial(&self) -> String {
        self.display_name_or("?")
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Company name, when it is not already the primary label
    #[must_use]
    pub fn secondary_text(&self) -> Option<&str> {
        non_blank(&self.display_name).and(non_blank(&self.company_name))
    }
}

/// Check if text is an absolute http(s) URL
#[must_use]
pub fn is_valid_url(text: &str) -> bool {
    url_host(text.trim()).is_some()
}

/// Extract valid http(s) URLs from free-form text
///
/// Tokens are split on whitespace and commas.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<&str> {
    TOKEN_SPLIT
        .split(text.trim())
        .map(str::trim)
        .filter(|token| !token.is_empty() && is_valid_url(token))
        .collect()
}

/// Host label for a URL with any leading `www.` removed
///
/// Returns the input unchanged when it is not a valid URL.
#[must_use]
pub fn url_label(url: &str) -> &str {
    match url_host(url) {
        Some(host) => host.strip_prefix("www.").unwrap_or(host),
        None => url,
    }
}

fn url_host(text: &str) -> Option<&str> {
    let caps = HTTP_URL.captures(text)?;
    let authority = caps.name("authority")?.as_str();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host_port.split_once(':').map_or(host_port, |(h, _)| h);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
