//! One run of the tool: shared dedup state and sink across every source crawled.

use std::path::PathBuf;
use tracing::info;

use crate::catalog::Source;
use crate::config::Settings;
use crate::crawl::{CrawlPlan, Crawler};
use crate::dedup::SeenSet;
use crate::error::SinkError;
use crate::fetch::Fetcher;
use crate::sink::{HeaderPolicy, Sink, SinkTargets};

/// Command-line adjustments to the configured crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOverrides {
    pub max_pages: Option<u32>,
    pub fetch_detail: Option<bool>,
}

/// Outcome of crawling one source.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Source,
    pub records: usize,
    pub targets: SinkTargets,
    /// Aggregate JSON array, when any record was saved
    pub json: Option<PathBuf>,
}

pub struct Session {
    settings: Settings,
    crawler: Crawler,
    seen: SeenSet,
    sink: Sink,
}

impl Session {
    pub fn new(settings: Settings, fetcher: Box<dyn Fetcher>) -> Self {
        let policy = if settings.strict_csv_header {
            HeaderPolicy::Strict
        } else {
            HeaderPolicy::Fixed
        };
        Self {
            settings,
            crawler: Crawler::new(fetcher),
            seen: SeenSet::new(),
            sink: Sink::new(policy),
        }
    }

    /// Distinct records admitted so far in this session.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn run_source(
        &mut self,
        source: Source,
        overrides: &SourceOverrides,
    ) -> Result<SourceReport, SinkError> {
        let spec = source.spec();
        let targets = SinkTargets::for_stem(&self.settings.data_dir, spec.stem);
        if spec.fresh_start {
            self.sink.reset(&targets)?;
        }

        let plan = CrawlPlan {
            max_pages: overrides
                .max_pages
                .unwrap_or_else(|| source.default_pages(&self.settings)),
            fetch_detail: overrides.fetch_detail.unwrap_or(self.settings.fetch_detail),
            targets: SinkTargets {
                json: targets
                    .json
                    .clone()
                    .filter(|_| self.settings.incremental_json),
                ..targets.clone()
            },
            category: spec.category.map(String::from),
        };

        info!(source = spec.label, pages = plan.max_pages, "crawling");
        let listing = source.listing();
        let records =
            self.crawler
                .crawl(listing.as_ref(), &plan, &mut self.seen, &mut self.sink)?;

        let json = match (&targets.json, records.is_empty()) {
            (Some(path), false) => {
                self.sink.write_aggregate(path, &records)?;
                Some(path.clone())
            }
            _ => None,
        };
        info!(source = spec.label, records = records.len(), "source finished");

        Ok(SourceReport {
            source,
            records: records.len(),
            targets,
            json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EXPLORE_URL;
    use crate::crawl::tests::{list_page, FakeFetcher};
    use crate::crawl::{Listing, Top250Listing};
    use std::fs;

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            fetch_detail: false,
            top250_pages: 1,
            ..Settings::default()
        }
    }

    #[test]
    fn test_run_source_writes_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default().with(
            Top250Listing.page_url(0),
            list_page(&[("1292052", "肖申克的救赎"), ("1291546", "霸王别姬")]),
        );
        let mut session = Session::new(settings(dir.path()), Box::new(fetcher));

        let report = session
            .run_source(Source::Top250, &SourceOverrides::default())
            .unwrap();

        assert_eq!(report.records, 2);
        let json_path = dir.path().join("douban_top250.json");
        assert_eq!(report.json.as_deref(), Some(json_path.as_path()));
        let array: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(array.as_array().unwrap().len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("douban_top250.jsonl"))
                .unwrap()
                .lines()
                .count(),
            2
        );
        let csv = fs::read_to_string(dir.path().join("douban_top250.csv")).unwrap();
        assert!(csv.starts_with("\u{feff}movie_id,title,rating"));
        assert_eq!(session.seen_count(), 2);
    }

    #[test]
    fn test_top250_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("douban_top250.jsonl");
        fs::write(&stale, "{\"title\":\"stale\"}\n").unwrap();
        let fetcher = FakeFetcher::default().with(
            Top250Listing.page_url(0),
            list_page(&[("1292052", "肖申克的救赎")]),
        );
        let mut session = Session::new(settings(dir.path()), Box::new(fetcher));

        session
            .run_source(Source::Top250, &SourceOverrides::default())
            .unwrap();

        let jsonl = fs::read_to_string(&stale).unwrap();
        assert!(!jsonl.contains("stale"));
        assert_eq!(jsonl.lines().count(), 1);
    }

    #[test]
    fn test_sources_share_dedup_state() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default()
            .with(
                Top250Listing.page_url(0),
                list_page(&[("1292052", "肖申克的救赎")]),
            )
            .with(
                EXPLORE_URL,
                list_page(&[("1292052", "肖申克的救赎"), ("1889243", "星际穿越")]),
            );
        let mut session = Session::new(settings(dir.path()), Box::new(fetcher));

        session
            .run_source(Source::Top250, &SourceOverrides::default())
            .unwrap();
        let report = session
            .run_source(Source::Classic, &SourceOverrides::default())
            .unwrap();

        assert_eq!(report.records, 1);
        let jsonl = fs::read_to_string(dir.path().join("douban_classic_movies.jsonl")).unwrap();
        assert!(jsonl.contains("星际穿越"));
        assert!(jsonl.contains("经典电影"));
        assert!(!jsonl.contains("肖申克的救赎"));
    }

    #[test]
    fn test_empty_source_skips_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(settings(dir.path()), Box::new(FakeFetcher::default()));
        let overrides = SourceOverrides {
            max_pages: Some(3),
            fetch_detail: Some(true),
        };

        let report = session.run_source(Source::Japanese, &overrides).unwrap();

        assert_eq!(report.records, 0);
        assert_eq!(report.json, None);
        assert!(!dir.path().join("douban_japanese_movies.json").exists());
    }
}
