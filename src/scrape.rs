use std::time::Duration;

use reqwest::header::{LOCATION, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::source::WorkId;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const TITLE_SELECTORS: &[&str] = &["h2.title", "div.meta h1"];
const AUTHOR_SELECTORS: &[&str] = &["dd.author a[rel=\"author\"]", "a[rel=\"author\"]"];
const LANGUAGE_SELECTOR: &str = "dd.language";
const CONTAINER_SELECTOR: &str = "div#chapters";
const BLOCK_SELECTOR: &str = "p, h2, h3, h4, blockquote, li";

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_AUTHOR: &str = "Anonymous";
const DEFAULT_LANGUAGE: &str = "en";

/// Marker the archive puts in the redirect target when a work is only visible
/// to logged-in users.
const RESTRICTED_MARKER: &str = "restricted=true";

const LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("English", "en"),
    ("Português europeu", "pt"),
    ("Português brasileiro", "pt"),
    ("Español", "es"),
    ("Français", "fr"),
    ("Deutsch", "de"),
    ("Italiano", "it"),
    ("中文-普通话 國語", "zh"),
    ("日本語", "ja"),
    ("한국어", "ko"),
    ("Русский", "ru"),
];

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("restricted work: the archive only shows this work to logged-in users")]
    AccessRestricted,

    #[error("archive request failed: HTTP {status}")]
    Http { status: u16 },

    #[error("unexpected page structure: {0}")]
    Structure(String),

    #[error("no content blocks found in work")]
    EmptyContent,

    #[error("archive request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedWork {
    pub work_id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub language: String,
    pub blocks: Vec<String>,
}

/// Metadata and blocks as they appear in a single work page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedWork {
    pub title: String,
    pub author: String,
    pub language: String,
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WorkScraper {
    client: reqwest::Client,
    base_url: String,
}

impl WorkScraper {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_work(&self, work_id: &WorkId) -> Result<ExtractedWork, ScrapeError> {
        let url = work_id.fetch_url(&self.base_url);
        tracing::debug!(%work_id, url = %url, "fetch work");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let html = if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .ok_or(ScrapeError::Http {
                    status: status.as_u16(),
                })?;
            if location.contains(RESTRICTED_MARKER) {
                return Err(ScrapeError::AccessRestricted);
            }
            let target = resolve_location(&url, &location)?;
            tracing::debug!(%work_id, target = %target, "follow redirect");
            self.fetch_body(&target).await?
        } else if status.is_success() {
            response.text().await?
        } else {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
            });
        };

        let parsed = parse_work_html(&html)?;
        tracing::info!(
            %work_id,
            title = %parsed.title,
            language = %parsed.language,
            blocks = parsed.blocks.len(),
            "work extracted"
        );

        Ok(ExtractedWork {
            work_id: work_id.to_string(),
            url,
            title: parsed.title,
            author: parsed.author,
            language: parsed.language,
            blocks: parsed.blocks,
        })
    }

    async fn fetch_body(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

fn resolve_location(request_url: &str, location: &str) -> Result<String, ScrapeError> {
    let base = Url::parse(request_url)
        .map_err(|err| ScrapeError::Structure(format!("invalid request url: {err}")))?;
    let target = base
        .join(location)
        .map_err(|err| ScrapeError::Structure(format!("invalid redirect location: {err}")))?;
    Ok(target.to_string())
}

pub fn parse_work_html(html: &str) -> Result<ParsedWork, ScrapeError> {
    let document = Html::parse_document(html);

    let title = first_text(&document, TITLE_SELECTORS).unwrap_or_else(|| DEFAULT_TITLE.to_owned());
    let author =
        first_text(&document, AUTHOR_SELECTORS).unwrap_or_else(|| DEFAULT_AUTHOR.to_owned());
    let language = first_text(&document, &[LANGUAGE_SELECTOR])
        .map(|label| map_language(&label).to_owned())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned());

    let container_selector = selector(CONTAINER_SELECTOR)?;
    let container = document.select(&container_selector).next().ok_or_else(|| {
        ScrapeError::Structure("content container div#chapters not found".to_owned())
    })?;

    let block_selector = selector(BLOCK_SELECTOR)?;
    let blocks = container
        .select(&block_selector)
        .filter_map(|el| block_fragment(&el))
        .collect::<Vec<_>>();
    if blocks.is_empty() {
        return Err(ScrapeError::EmptyContent);
    }

    Ok(ParsedWork {
        title,
        author,
        language,
        blocks,
    })
}

pub fn map_language(label: &str) -> &'static str {
    let label = label.trim();
    LANGUAGE_TABLE
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_LANGUAGE)
}

fn block_fragment(el: &ElementRef<'_>) -> Option<String> {
    let inner = el.inner_html();
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }
    let tag = el.value().name();
    Some(format!("<{tag}>{inner}</{tag}>"))
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let sel = Selector::parse(raw).ok()?;
        let text = document
            .select(&sel)
            .next()?
            .text()
            .collect::<String>()
            .trim()
            .to_owned();
        (!text.is_empty()).then_some(text)
    })
}

fn selector(raw: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(raw)
        .map_err(|err| ScrapeError::Structure(format!("invalid selector {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK_HTML: &str = r#"<!doctype html>
<html>
  <head><title>ignored</title></head>
  <body>
    <div class="preface group">
      <h2 class="title heading">  The Long Road  </h2>
      <h3 class="byline heading"><a rel="author" href="/users/someone">someone</a></h3>
    </div>
    <dl class="work meta group">
      <dd class="language" lang="fr">Français</dd>
    </dl>
    <div id="chapters" role="article">
      <h3 class="landmark heading">Chapter Text</h3>
      <p>First <em>paragraph</em>.</p>
      <p>   </p>
      <div class="userstuff"><span>not a block</span></div>
      <blockquote><p>Quoted</p></blockquote>
      <ul><li>Item one</li></ul>
      <h5>ignored heading</h5>
      <h2>Part Two</h2>
    </div>
  </body>
</html>"#;

    #[test]
    fn parses_metadata_with_fallbacks() {
        let parsed = parse_work_html(WORK_HTML).unwrap();
        assert_eq!(parsed.title, "The Long Road");
        assert_eq!(parsed.author, "someone");
        assert_eq!(parsed.language, "fr");
    }

    #[test]
    fn blocks_follow_document_order_and_keep_inline_markup() {
        let parsed = parse_work_html(WORK_HTML).unwrap();
        assert_eq!(
            parsed.blocks,
            vec![
                "<h3>Chapter Text</h3>".to_owned(),
                "<p>First <em>paragraph</em>.</p>".to_owned(),
                "<blockquote><p>Quoted</p></blockquote>".to_owned(),
                "<p>Quoted</p>".to_owned(),
                "<li>Item one</li>".to_owned(),
                "<h2>Part Two</h2>".to_owned(),
            ]
        );
    }

    #[test]
    fn defaults_when_metadata_is_missing() {
        let html = r#"<html><body><div class="meta"></div>
            <div id="chapters"><p>Only text</p></div></body></html>"#;
        let parsed = parse_work_html(html).unwrap();
        assert_eq!(parsed.title, "Untitled");
        assert_eq!(parsed.author, "Anonymous");
        assert_eq!(parsed.language, "en");
    }

    #[test]
    fn title_falls_back_to_meta_heading() {
        let html = r#"<html><body><div class="meta"><h1>Fallback Title</h1></div>
            <a rel="author" href="/u">writer</a>
            <div id="chapters"><p>x</p></div></body></html>"#;
        let parsed = parse_work_html(html).unwrap();
        assert_eq!(parsed.title, "Fallback Title");
        assert_eq!(parsed.author, "writer");
    }

    #[test]
    fn missing_container_is_a_structure_error() {
        let err = parse_work_html("<html><body><p>text</p></body></html>").unwrap_err();
        assert!(matches!(err, ScrapeError::Structure(_)));
    }

    #[test]
    fn container_without_blocks_is_empty_content() {
        let html = r#"<html><body><div id="chapters"><p>  </p><div>x</div></div></body></html>"#;
        let err = parse_work_html(html).unwrap_err();
        assert!(matches!(err, ScrapeError::EmptyContent));
    }

    #[test]
    fn unmapped_language_defaults_to_english() {
        assert_eq!(map_language(" 日本語 "), "ja");
        assert_eq!(map_language("Português brasileiro"), "pt");
        assert_eq!(map_language("Klingon"), "en");
    }
}
