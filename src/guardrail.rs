//! Output guardrails: secret masking and dead-link scrubbing.
//!
//! Masking is unconditional and runs both before and after URL handling, so
//! nothing matching [`secret_pattern`] survives [`scrub_and_verify`]. URLs
//! are checked through a [`UrlVerifier`]; any URL that does not answer with
//! a 2xx/3xx status inside the timeout is replaced by [`URL_DISCLAIMER`].

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Replacement for anything that looks like a credential.
pub const REDACTED: &str = "[REDACTED-SECRET]";

/// Replacement for URLs that failed verification.
pub const URL_DISCLAIMER: &str = "\"I don't know the exact URL\"";

/// Characters stripped from the end of a URL before probing it.
const URL_TRAILING_PUNCT: &[char] = &['.', ',', ')', ';', ']'];

static SECRET_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();

/// API-key shaped substrings: OpenAI `sk-…`, AWS `AKIA…`, Pinecone `pi_…`,
/// and `<vendor>_key: value` assignments.
pub fn secret_pattern() -> &'static Regex {
    SECRET_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(sk-[A-Za-z0-9\-_]{16,}|AKIA[0-9A-Z]{16,}|pi_[A-Za-z0-9\-_]{16,}|(?:openai|aws|pinecone|api)_?key[^:\s=]*[:=]?\s*[A-Za-z0-9\-_\.]{8,})",
        )
        .expect("secret pattern is a valid regex")
    })
}

pub fn url_pattern() -> &'static Regex {
    URL_RE.get_or_init(|| {
        Regex::new(r#"(?i)https?://[^\s\)\]\}<>"]+"#).expect("url pattern is a valid regex")
    })
}

pub fn mask_secrets(text: &str) -> String {
    secret_pattern().replace_all(text, REDACTED).into_owned()
}

/// All URL-shaped substrings in order of appearance, duplicates included.
pub fn find_urls(text: &str) -> Vec<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Reachability check for a single URL.
#[async_trait]
pub trait UrlVerifier: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

/// HEAD, then GET if HEAD is not 2xx/3xx. Redirects are followed; any
/// transport error or timeout counts as unreachable.
pub struct HttpUrlVerifier {
    client: reqwest::Client,
}

impl HttpUrlVerifier {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn status_ok(status: reqwest::StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

#[async_trait]
impl UrlVerifier for HttpUrlVerifier {
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) if status_ok(resp.status()) => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                return false;
            }
        }
        match self.client.get(url).send().await {
            Ok(resp) => status_ok(resp.status()),
            Err(e) => {
                tracing::debug!("GET {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Result of [`scrub_and_verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrubbed {
    pub text: String,
    /// At least one URL failed verification and was replaced.
    pub had_unverified_url: bool,
}

/// Mask secrets, check every URL, replace the dead ones, mask again.
pub async fn scrub_and_verify(raw: &str, verifier: &dyn UrlVerifier) -> Scrubbed {
    let mut text = mask_secrets(raw);
    let mut had_unverified_url = false;
    let mut verdicts: HashMap<String, bool> = HashMap::new();

    for url in find_urls(&text) {
        let target = url.trim_end_matches(URL_TRAILING_PUNCT).to_string();
        let ok = match verdicts.get(&target) {
            Some(&ok) => ok,
            None => {
                let ok = verifier.is_reachable(&target).await;
                verdicts.insert(target.clone(), ok);
                ok
            }
        };
        if !ok {
            tracing::info!("replacing unverified URL: {}", target);
            had_unverified_url = true;
            text = text.replace(&url, URL_DISCLAIMER);
        }
    }

    Scrubbed {
        text: mask_secrets(&text),
        had_unverified_url,
    }
}
