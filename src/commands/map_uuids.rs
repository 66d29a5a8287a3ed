use std::time::Duration;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserOptions, By, IDENTIFIER_FIELD_XPATH, WebDriver};
use crate::cli::MapUuidsArgs;
use crate::config::AppConfig;
use crate::identifier::{IdentifierMatcher, UNKNOWN_IDENTIFIER};
use crate::model::UuidMapping;
use crate::store::UuidMapWriter;

const ITEM_LINK_CSS: &str = "a.btn.ghost[rel='bookmark']";
const NEXT_PAGE_CSS: &str = "li.pager__item--next a";
const LISTING_WAIT: Duration = Duration::from_secs(20);
const ITEM_WAIT: Duration = Duration::from_secs(10);

/// The pages a crawl reads: a paginated listing of item links and the
/// item pages those links lead to.
pub trait CollectionBrowser {
    fn open(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Absolute item URLs on the current listing page.
    fn item_links(&mut self) -> Result<Vec<String>, BrowserError>;

    fn next_page_link(&mut self) -> Result<Option<String>, BrowserError>;

    /// Text of the identifier field on the current item page.
    fn identifier_text(&mut self) -> Result<String, BrowserError>;
}

impl CollectionBrowser for WebDriver {
    fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        self.goto(url)
    }

    fn item_links(&mut self) -> Result<Vec<String>, BrowserError> {
        let links = self.wait_for_all(By::Css(ITEM_LINK_CSS), LISTING_WAIT)?;
        let mut hrefs = Vec::with_capacity(links.len());
        for link in &links {
            if let Some(href) = self.property(link, "href")? {
                hrefs.push(href);
            }
        }
        Ok(hrefs)
    }

    fn next_page_link(&mut self) -> Result<Option<String>, BrowserError> {
        match self.find_all(By::Css(NEXT_PAGE_CSS))?.first() {
            Some(link) => self.property(link, "href"),
            None => Ok(None),
        }
    }

    fn identifier_text(&mut self) -> Result<String, BrowserError> {
        let field = self.wait_for(By::XPath(IDENTIFIER_FIELD_XPATH), ITEM_WAIT)?;
        self.text(&field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: usize,
    pub items: usize,
    pub unidentified: usize,
    pub failed: usize,
}

pub fn run(args: MapUuidsArgs) -> Result<()> {
    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| args.docs_dir.join("config.toml"));
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.docs_dir.join("uuid_mapping.csv"));

    let config = AppConfig::load(&config_path)?;
    let matcher = IdentifierMatcher::new()?;

    info!(
        collection = %config.credentials.collection_url,
        output = %output_path.display(),
        "starting UUID crawl"
    );

    let mut browser = WebDriver::connect(
        &args.webdriver_url,
        &BrowserOptions {
            headless: args.headless,
        },
    )
    .with_context(|| format!("failed to start browser session via {}", args.webdriver_url))?;

    let stats = rebuild_mapping(
        &mut browser,
        &config.credentials.collection_url,
        &matcher,
        &output_path,
        args.max_pages,
    );
    browser.close();
    let stats = stats?;

    info!(
        pages = stats.pages,
        items = stats.items,
        unidentified = stats.unidentified,
        failed = stats.failed,
        path = %output_path.display(),
        "UUID mapping complete"
    );
    Ok(())
}

/// Crawls into a sibling temp file and replaces `output_path` only when the
/// crawl produced rows; an existing mapping survives a failed crawl.
pub fn rebuild_mapping<B: CollectionBrowser + ?Sized>(
    browser: &mut B,
    collection_url: &str,
    matcher: &IdentifierMatcher,
    output_path: &Path,
    max_pages: Option<usize>,
) -> Result<CrawlStats> {
    let tmp_path = output_path.with_extension("csv.tmp");
    let mut writer = UuidMapWriter::create(&tmp_path)?;
    let crawled = crawl_collection(browser, collection_url, matcher, &mut writer, max_pages);
    let rows = writer.rows_written();
    drop(writer);

    let stats = match crawled {
        Ok(stats) if rows > 0 => stats,
        Ok(_) => {
            discard_partial(&tmp_path);
            bail!(
                "crawl of {collection_url} found no items; keeping {}",
                output_path.display()
            );
        }
        Err(err) => {
            discard_partial(&tmp_path);
            return Err(err);
        }
    };

    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "failed to replace {} with {}",
            output_path.display(),
            tmp_path.display()
        )
    })?;
    Ok(stats)
}

fn discard_partial(tmp_path: &Path) {
    if let Err(err) = fs::remove_file(tmp_path) {
        warn!(path = %tmp_path.display(), error = %err, "cannot remove partial mapping");
    }
}

/// Walks the listing from `collection_url`, writing one mapping row per
/// item. Item failures are written as `unknown` rows; a listing page that
/// cannot be read ends the crawl.
pub fn crawl_collection<B: CollectionBrowser + ?Sized>(
    browser: &mut B,
    collection_url: &str,
    matcher: &IdentifierMatcher,
    writer: &mut UuidMapWriter,
    max_pages: Option<usize>,
) -> Result<CrawlStats> {
    let mut stats = CrawlStats::default();
    let mut page_url = Some(collection_url.to_string());

    while let Some(url) = page_url.take() {
        if max_pages.is_some_and(|max| stats.pages >= max) {
            info!(pages = stats.pages, "page limit reached");
            break;
        }
        stats.pages += 1;

        let links = match browser.open(&url).and_then(|()| browser.item_links()) {
            Ok(links) => links,
            Err(err) => {
                warn!(page = stats.pages, url = %url, error = %err, "cannot read listing page; stopping");
                break;
            }
        };
        let next = browser.next_page_link().unwrap_or_else(|err| {
            warn!(page = stats.pages, error = %err, "cannot read pager; treating as last page");
            None
        });
        info!(page = stats.pages, items = links.len(), "processing listing page");

        for (idx, item_url) in links.iter().enumerate() {
            let row = scrape_item(browser, matcher, item_url, &mut stats);
            writer.append(&row)?;
            stats.items += 1;
            info!(
                item = idx + 1,
                of = links.len(),
                base_identifier = %row.base_identifier,
                uuid = %row.uuid,
                "mapped item"
            );
        }

        page_url = next;
    }

    Ok(stats)
}

fn scrape_item<B: CollectionBrowser + ?Sized>(
    browser: &mut B,
    matcher: &IdentifierMatcher,
    item_url: &str,
    stats: &mut CrawlStats,
) -> UuidMapping {
    let uuid = uuid_from_item_url(item_url);

    match browser.open(item_url).and_then(|()| browser.identifier_text()) {
        Ok(text) => {
            let original = text.trim().to_string();
            let base = matcher.extract_or_unknown(&original).to_string();
            if base == UNKNOWN_IDENTIFIER {
                stats.unidentified += 1;
            }
            UuidMapping {
                original_identifier: original,
                base_identifier: base,
                uuid,
            }
        }
        Err(err) => {
            warn!(url = %item_url, error = %err, "identifier not found");
            stats.failed += 1;
            UuidMapping {
                original_identifier: UNKNOWN_IDENTIFIER.to_string(),
                base_identifier: UNKNOWN_IDENTIFIER.to_string(),
                uuid,
            }
        }
    }
}

/// The UUID is the last path segment of the item URL.
pub fn uuid_from_item_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .unwrap_or(UNKNOWN_IDENTIFIER)
        .to_string()
}
