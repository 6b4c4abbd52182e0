//! Listing extraction from rendered company pages.
//!
//! Each source page carries a company heading and a table whose rows hold a
//! link cell (title and department spans inside an anchor) followed by a
//! location cell.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{RowParseError, SourceError};
use crate::models::{RawListing, UNKNOWN_COMPANY};
use crate::renderer::PageRenderer;

const COMPANY_SELECTOR: &str = "div.text-blue-700.text-5xl.font-bold.font-heading";
const TABLE_BODY_SELECTOR: &str = "table tbody";

/// Span text marking provenance badges rather than a department
const PROVENANCE_MARKER: &str = "Verified";

struct ListingSelectors {
    company: Selector,
    table_body: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
    span: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {:?}: {}", css, e))
}

impl ListingSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            company: selector(COMPANY_SELECTOR)?,
            table_body: selector(TABLE_BODY_SELECTOR)?,
            row: selector("tr")?,
            cell: selector("td")?,
            anchor: selector("a")?,
            span: selector("span")?,
        })
    }
}

/// Everything recovered from one source page
#[derive(Debug, Default)]
pub struct SourcePage {
    /// `None` when the company heading was missing or empty
    pub company: Option<String>,
    pub listings: Vec<RawListing>,
    /// Row index within the table body, with the reason it was skipped
    pub row_errors: Vec<(usize, RowParseError)>,
}

/// Outcome of extracting every configured source
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub listings: Vec<RawListing>,
    pub failed_sources: Vec<SourceError>,
    pub skipped_rows: usize,
}

pub struct ListingExtractor {
    renderer: Box<dyn PageRenderer>,
    selectors: ListingSelectors,
    page_timeout: Duration,
}

impl ListingExtractor {
    pub fn new(renderer: Box<dyn PageRenderer>, page_timeout: Duration) -> Result<Self> {
        Ok(Self {
            renderer,
            selectors: ListingSelectors::new()?,
            page_timeout,
        })
    }

    /// Extract all sources in order. Failed sources are logged and skipped.
    pub async fn extract_all(&self, sources: &[String]) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for (idx, url) in sources.iter().enumerate() {
            info!("[{}/{}] processing {}", idx + 1, sources.len(), url);

            match self.extract_source(url).await {
                Ok(page) => {
                    report.skipped_rows += page.row_errors.len();
                    report.listings.extend(page.listings);
                }
                Err(e) => {
                    warn!("skipping source: {}", e);
                    report.failed_sources.push(e);
                }
            }
        }

        report
    }

    pub async fn extract_source(&self, url: &str) -> Result<SourcePage, SourceError> {
        let html = match tokio::time::timeout(self.page_timeout, self.renderer.render(url)).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                return Err(SourceError::Render {
                    url: url.to_string(),
                    reason: format!("{:#}", e),
                })
            }
            Err(_) => {
                return Err(SourceError::Timeout {
                    url: url.to_string(),
                    timeout: self.page_timeout,
                })
            }
        };

        let page = self.parse_page(&html, url)?;

        let company = page.company.as_deref().unwrap_or(UNKNOWN_COMPANY);
        if page.company.is_none() {
            warn!("company name missing at {}", url);
        }
        for (row, err) in &page.row_errors {
            warn!("[{}] row {} parse error: {}", company, row, err);
        }
        debug!(url, company, listings = page.listings.len(), "parsed source page");

        Ok(page)
    }

    /// Parse an already-rendered page. Pure apart from the input HTML.
    pub fn parse_page(&self, html: &str, source_url: &str) -> Result<SourcePage, SourceError> {
        let document = Html::parse_document(html);

        let company = document
            .select(&self.selectors.company)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty());
        let company_name = company.clone().unwrap_or_else(|| UNKNOWN_COMPANY.to_string());

        let tbody = document
            .select(&self.selectors.table_body)
            .next()
            .ok_or_else(|| SourceError::MissingTable {
                url: source_url.to_string(),
            })?;

        let base = Url::parse(source_url).ok();
        let mut page = SourcePage {
            company,
            ..SourcePage::default()
        };

        for (idx, row) in tbody.select(&self.selectors.row).enumerate() {
            let cells: Vec<ElementRef> = row.select(&self.selectors.cell).collect();
            if cells.len() < 2 {
                debug!(source_url, row = idx, "skipping row with {} cells", cells.len());
                continue;
            }

            match self.parse_row(cells[0], cells[1], base.as_ref()) {
                Ok(fields) => page.listings.push(RawListing {
                    source_id: source_url.to_string(),
                    company: company_name.clone(),
                    position: fields.position,
                    department: fields.department,
                    location: fields.location,
                    external_link: fields.external_link,
                }),
                Err(e) => page.row_errors.push((idx, e)),
            }
        }

        Ok(page)
    }

    fn parse_row(
        &self,
        link_cell: ElementRef,
        location_cell: ElementRef,
        base: Option<&Url>,
    ) -> Result<RowFields, RowParseError> {
        let anchor = link_cell
            .select(&self.selectors.anchor)
            .next()
            .ok_or(RowParseError::MissingAnchor)?;

        let href = anchor.value().attr("href").ok_or(RowParseError::MissingHref)?;
        let external_link = resolve_href(href.trim(), base)?;

        let spans: Vec<String> = anchor.select(&self.selectors.span).map(element_text).collect();
        let position = spans.first().cloned().unwrap_or_default();
        let department = spans
            .iter()
            .find(|text| **text != position && !text.contains(PROVENANCE_MARKER))
            .cloned()
            .unwrap_or_default();

        Ok(RowFields {
            position,
            department,
            location: element_text(location_cell),
            external_link,
        })
    }
}

struct RowFields {
    position: String,
    department: String,
    location: String,
    external_link: String,
}

/// Visible text of an element with whitespace collapsed
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_href(href: &str, base: Option<&Url>) -> Result<String, RowParseError> {
    if href.is_empty() {
        return Err(RowParseError::EmptyHref);
    }

    let resolved = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    };

    resolved
        .map(|u| u.to_string())
        .map_err(|e| RowParseError::InvalidHref {
            href: href.to_string(),
            reason: e.to_string(),
        })
}
