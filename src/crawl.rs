//! Pagination over one crawl source, feeding admitted records to the sink.

use scraper::Html;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::{BASE_URL, CATEGORY_API_URL, EXPLORE_URL, REGION_API_URL};
use crate::dedup::SeenSet;
use crate::error::{ItemError, PageError, SinkError};
use crate::extract::api::{extract_api_item, page_items};
use crate::extract::detail::extract_detail;
use crate::extract::list::{
    extract_generic_item, extract_list_item, find_movie_items, find_top250_items,
};
use crate::fetch::{Fetcher, RequestKind};
use crate::merge::merge;
use crate::normalize::normalize;
use crate::sink::{Sink, SinkTargets};
use crate::types::{MovieRecord, RawMovie};

const TOP250_PAGE_SIZE: u32 = 25;
const API_PAGE_SIZE: u32 = 20;

/// Items of one listing page; each item either parsed or the reason it was skipped.
pub type PageItems = Vec<Result<RawMovie, ItemError>>;

/// A paginated source of movie items.
pub trait Listing {
    fn name(&self) -> &str;

    fn page_url(&self, page: u32) -> String;

    fn request_kind(&self) -> RequestKind {
        RequestKind::Page
    }

    fn parse_page(&self, url: &str, body: &str) -> Result<PageItems, PageError>;

    /// Hard page limit of the source itself, independent of the crawl plan.
    fn max_pages(&self) -> Option<u32> {
        None
    }

    /// Whether a page that admitted no new records ends the crawl.
    fn stops_when_stale(&self, _page: u32) -> bool {
        false
    }
}


fn api_items(url: &str, body: &str) -> Result<PageItems, PageError> {
    let payload: Value = serde_json::from_str(body).map_err(|source| PageError::Decode {
        url: url.to_string(),
        source,
    })?;
    Ok(page_items(&payload).iter().map(extract_api_item).collect())
}

fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{base}?{query}")
}

/// The Top 250 chart, 25 items per page.
pub struct Top250Listing;

impl Listing for Top250Listing {
    fn name(&self) -> &str {
        "top250"
    }

    fn page_url(&self, page: u32) -> String {
        let start = (page * TOP250_PAGE_SIZE).to_string();
        with_query(
            &format!("{BASE_URL}/top250"),
            &[("start", start.as_str()), ("filter", "")],
        )
    }

    fn parse_page(&self, _url: &str, body: &str) -> Result<PageItems, PageError> {
        let doc = Html::parse_document(body);
        Ok(find_top250_items(&doc)
            .into_iter()
            .map(|item| extract_list_item(item).ok_or(ItemError::Untitled))
            .collect())
    }
}

/// The explore grid. Only its first page is server-rendered.
pub struct ExploreListing;

impl Listing for ExploreListing {
    fn name(&self) -> &str {
        "explore"
    }

    fn page_url(&self, _page: u32) -> String {
        EXPLORE_URL.to_string()
    }

    fn parse_page(&self, _url: &str, body: &str) -> Result<PageItems, PageError> {
        let doc = Html::parse_document(body);
        Ok(find_movie_items(&doc)
            .into_iter()
            .map(|item| {
                extract_list_item(item)
                    .or_else(|| extract_generic_item(item))
                    .ok_or(ItemError::Untitled)
            })
            .collect())
    }

    fn max_pages(&self) -> Option<u32> {
        Some(1)
    }
}

/// The recent-hot category API (e.g. "豆瓣高分").
pub struct CategoryApiListing {
    pub category: String,
}

impl Listing for CategoryApiListing {
    fn name(&self) -> &str {
        &self.category
    }

    fn page_url(&self, page: u32) -> String {
        let start = (page * API_PAGE_SIZE).to_string();
        let limit = API_PAGE_SIZE.to_string();
        with_query(
            CATEGORY_API_URL,
            &[
                ("start", start.as_str()),
                ("limit", limit.as_str()),
                ("category", self.category.as_str()),
                ("type", "全部"),
            ],
        )
    }

    fn request_kind(&self) -> RequestKind {
        RequestKind::Api
    }

    fn parse_page(&self, url: &str, body: &str) -> Result<PageItems, PageError> {
        api_items(url, body)
    }

    fn stops_when_stale(&self, page: u32) -> bool {
        page > 0
    }
}

/// The recommendation API filtered to one region (e.g. "华语").
pub struct RegionApiListing {
    pub region: String,
}

impl Listing for RegionApiListing {
    fn name(&self) -> &str {
        &self.region
    }

    fn page_url(&self, page: u32) -> String {
        let start = (page * API_PAGE_SIZE).to_string();
        let count = API_PAGE_SIZE.to_string();
        let selected = serde_json::json!({ "地区": self.region }).to_string();
        with_query(
            REGION_API_URL,
            &[
                ("refresh", "0"),
                ("start", start.as_str()),
                ("count", count.as_str()),
                ("selected_categories", selected.as_str()),
                ("uncollect", "false"),
                ("score_range", "0,10"),
                ("tags", self.region.as_str()),
            ],
        )
    }

    fn request_kind(&self) -> RequestKind {
        RequestKind::Api
    }

    fn parse_page(&self, url: &str, body: &str) -> Result<PageItems, PageError> {
        api_items(url, body)
    }

    fn stops_when_stale(&self, _page: u32) -> bool {
        true
    }
}

/// How one source is crawled and where its records go.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub max_pages: u32,
    pub fetch_detail: bool,
    pub targets: SinkTargets,
    /// Label stamped on every record of the source
    pub category: Option<String>,
}

pub struct Crawler {
    fetcher: Box<dyn Fetcher>,
}

impl Crawler {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Crawl `listing` page by page. Records whose key `seen` already holds are
    /// skipped; every admitted record reaches `sink` before the next item.
    pub fn crawl(
        &self,
        listing: &dyn Listing,
        plan: &CrawlPlan,
        seen: &mut SeenSet,
        sink: &mut Sink,
    ) -> Result<Vec<MovieRecord>, SinkError> {
        let source = listing.name();
        let page_limit = listing
            .max_pages()
            .map_or(plan.max_pages, |max| max.min(plan.max_pages));
        let mut records = Vec::new();

        for page in 0..page_limit {
            let url = listing.page_url(page);
            info!(source, page = page + 1, "fetching page");

            let items = match self.fetch_page(listing, &url) {
                Ok(items) => items,
                Err(e) => {
                    warn!(source, page = page + 1, error = %e, "page failed");
                    Vec::new()
                }
            };
            if items.is_empty() {
                if page == 0 {
                    warn!(source, "no items on the first page");
                } else {
                    info!(source, page = page + 1, "no more items");
                }
                break;
            }

            let mut admitted = 0;
            for item in items {
                let raw = match item {
                    Ok(raw) => raw,
                    Err(ItemError::Untitled) => continue,
                    Err(e) => {
                        warn!(source, error = %e, "skipping item");
                        continue;
                    }
                };
                let key = raw.dedup_key();
                if !seen.admit(&key) {
                    debug!(source, key, "already seen");
                    continue;
                }

                let raw = if plan.fetch_detail {
                    self.with_detail(raw)
                } else {
                    raw
                };
                let mut record = normalize(raw);
                if let Some(category) = &plan.category {
                    record.category = Some(category.clone());
                }

                sink.append(&record, &plan.targets)?;
                debug!(source, title = record.title_or_unknown(), "saved");
                records.push(record);
                admitted += 1;
            }

            info!(source, page = page + 1, admitted, total = records.len(), "page done");
            if admitted == 0 && listing.stops_when_stale(page) {
                info!(source, "page brought no new records, stopping");
                break;
            }
        }

        Ok(records)
    }

    fn fetch_page(&self, listing: &dyn Listing, url: &str) -> Result<PageItems, PageError> {
        let body = self.fetcher.fetch(url, listing.request_kind())?;
        listing.parse_page(url, &body)
    }

    /// Merge the detail page into `raw`; a failed fetch keeps `raw` as is.
    fn with_detail(&self, raw: RawMovie) -> RawMovie {
        let Some(link) = raw.link.clone().filter(|l| !l.trim().is_empty()) else {
            return raw;
        };
        match self.fetcher.fetch(&link, RequestKind::Page) {
            Ok(body) => merge(raw, extract_detail(&body)),
            Err(e) => {
                warn!(link, error = %e, "detail page failed, keeping list data");
                raw
            }
        }
    }
}
