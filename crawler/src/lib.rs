use async_trait::async_trait;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use searchcore::{AcquisitionError, Acquire, RawDocument};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SOURCE_URL: &str = "https://en.wikipedia.org/wiki/Special:Random";
pub const DEFAULT_USER_AGENT: &str = "search-engine-rs-bot/0.1 (+https://example.com/bot)";

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Page that redirects to (or serves) a fresh article on every request.
    pub url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(12),
        }
    }
}

/// Fetches one article per `acquire` call and reduces it to plain text.
#[derive(Clone)]
pub struct WikiSource {
    client: Client,
    url: Url,
}

impl WikiSource {
    pub fn new(config: SourceConfig) -> anyhow::Result<Self> {
        let url = Url::parse(&config.url)?;
        let client = Client::builder()
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Acquire for WikiSource {
    async fn acquire(&self) -> Result<RawDocument, AcquisitionError> {
        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AcquisitionError::Fetch(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AcquisitionError::Rejected(format!("status {}", resp.status())));
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
            if let Ok(v) = ct.to_str() {
                if !v.starts_with("text/html") {
                    return Err(AcquisitionError::Rejected(format!("content type {v}")));
                }
            }
        }
        let final_url = resp.url().clone();
        let bytes = resp.bytes().await.map_err(|e| AcquisitionError::Fetch(e.to_string()))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(AcquisitionError::Rejected(format!("body of {} bytes", bytes.len())));
        }
        let body = String::from_utf8_lossy(&bytes);
        let doc = extract(&body, &final_url)?;
        tracing::debug!(title = %doc.title, link = %doc.link, "acquired document");
        Ok(doc)
    }
}

/// Reduce an article page to its title, canonical link and paragraph text.
pub fn extract(html: &str, page_url: &Url) -> Result<RawDocument, AcquisitionError> {
    let sel_title = Selector::parse("title").map_err(|e| AcquisitionError::Extract(e.to_string()))?;
    let sel_p = Selector::parse("p").map_err(|e| AcquisitionError::Extract(e.to_string()))?;

    let doc = Html::parse_document(html);
    let title = doc
        .select(&sel_title)
        .next()
        .map(|n| n.text().collect::<String>())
        .unwrap_or_default();
    let paragraphs: Vec<String> = doc
        .select(&sel_p)
        .map(|n| n.text().collect::<String>().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        return Err(AcquisitionError::Extract(format!("no paragraph text at {page_url}")));
    }
    Ok(RawDocument { title: title.trim().to_string(), link: canonical_link(page_url), content: paragraphs.join("\n") })
}

/// `scheme://host/path`, without query or fragment.
pub fn canonical_link(u: &Url) -> String {
    let mut s = u.clone();
    s.set_query(None);
    s.set_fragment(None);
    s.to_string()
}
