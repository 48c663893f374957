//! Website source: fetches pages and extracts their visible text.

use crate::error::AppError;
use crate::ingest::source_links::UNIVERSITY_LOGO;
use crate::ingest::{slugify, IngestDocument};
use crate::models::DocMetadata;
use futures::future::try_join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches all `urls` concurrently and returns one document per page.
pub async fn load_websites(
    http: &Client,
    urls: &[String],
    selector: &str,
) -> Result<Vec<IngestDocument>, AppError> {
    let documents = try_join_all(urls.iter().map(|url| fetch_page(http, url, selector))).await?;
    info!("Fetched {} web pages", documents.len());
    Ok(documents)
}

async fn fetch_page(
    http: &Client,
    url: &str,
    selector: &str,
) -> Result<IngestDocument, AppError> {
    let res = http.get(url).timeout(REQUEST_TIMEOUT).send().await?;
    let status = res.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!(
            "Fetching {} failed with status {}",
            url, status
        )));
    }
    let html = res.text().await?;

    let (title, content) = extract_text(&html, selector)?;
    let title = title.unwrap_or_else(|| url.to_string());

    Ok(IngestDocument {
        content,
        metadata: DocMetadata {
            id: slugify(&title),
            title: title.clone(),
            link: url.to_string(),
            favicon: UNIVERSITY_LOGO.to_string(),
            snippet: title,
        },
    })
}

/// Extracts the page title and the whitespace-normalized text of the
/// nodes matching `selector`. Parsing happens in one synchronous pass;
/// the parsed DOM never crosses an await point.
fn extract_text(html: &str, selector: &str) -> Result<(Option<String>, String), AppError> {
    let document = Html::parse_document(html);

    let content_selector = Selector::parse(selector)
        .map_err(|e| AppError::Validation(format!("Invalid CSS selector {:?}: {:?}", selector, e)))?;
    let title_selector = Selector::parse("title").expect("static selector");

    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let content = document
        .select(&content_selector)
        .flat_map(|el| el.text())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Ok((title, content))
}
