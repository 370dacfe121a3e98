//! Blocking HTTP fetching with retries, an optional response cache and a
//! politeness delay before every network request.

use anyhow::Result;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Settings, BASE_URL, EXPLORE_URL};
use crate::error::FetchError;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const API_ACCEPT: &str = "application/json, text/plain, */*";
const LANGUAGES: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// What a request is for; API requests carry different headers and a longer timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Page,
    Api,
}

pub trait Fetcher {
    /// Body of `url`, after the fetcher's own retries.
    fn fetch(&self, url: &str, kind: RequestKind) -> Result<String, FetchError>;
}

/// Pause taken before each network request.
pub trait Throttle {
    fn pause(&self);
}

/// Uniformly random delay between two bounds.
#[derive(Debug, Clone)]
pub struct RandomDelay {
    min_ms: u64,
    max_ms: u64,
}

impl RandomDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

impl Throttle for RandomDelay {
    fn pause(&self) {
        thread::sleep(self.next_delay());
    }
}

pub struct NoDelay;

impl Throttle for NoDelay {
    fn pause(&self) {}
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    cache_dir: Option<PathBuf>,
    throttle: Box<dyn Throttle>,
    page_timeout: Duration,
    api_timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings, throttle: Box<dyn Throttle>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGES));
        let client = reqwest::blocking::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            cache_dir: settings.cache_dir.clone(),
            throttle,
            page_timeout: settings.page_timeout(),
            api_timeout: settings.api_timeout(),
            retries: settings.retries,
            backoff: settings.retry_backoff(),
        })
    }

    /// Fetcher with the randomized delay configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let delay = RandomDelay::new(settings.delay_min_ms, settings.delay_max_ms);
        Self::new(settings, Box::new(delay))
    }

    fn read_cache(&self, url: &str) -> Option<String> {
        let cache_path = url_to_cache_path(self.cache_dir.as_deref()?, url);
        if !cache_path.exists() {
            return None;
        }
        match fs::read_to_string(&cache_path) {
            Ok(body) => {
                debug!(url, path = %cache_path.display(), "cache hit");
                Some(body)
            }
            Err(e) => {
                warn!(path = %cache_path.display(), error = %e, "unreadable cache entry");
                None
            }
        }
    }

    fn write_cache(&self, url: &str, body: &str) {
        let Some(cache_dir) = self.cache_dir.as_deref() else {
            return;
        };
        let cache_path = url_to_cache_path(cache_dir, url);
        let written = cache_path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&cache_path, body));
        if let Err(e) = written {
            warn!(path = %cache_path.display(), error = %e, "failed to write cache entry");
        }
    }

    fn request(&self, url: &str, kind: RequestKind) -> reqwest::Result<String> {
        let request = self.client.get(url);
        let request = match kind {
            RequestKind::Page => request
                .header(ACCEPT, PAGE_ACCEPT)
                .timeout(self.page_timeout),
            RequestKind::Api => request
                .header(ACCEPT, API_ACCEPT)
                .header(REFERER, EXPLORE_URL)
                .header(ORIGIN, BASE_URL)
                .timeout(self.api_timeout),
        };
        request.send()?.error_for_status()?.text()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, kind: RequestKind) -> Result<String, FetchError> {
        if let Some(body) = self.read_cache(url) {
            return Ok(body);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle.pause();
            match self.request(url, kind) {
                Ok(body) => {
                    self.write_cache(url, &body);
                    return Ok(body);
                }
                Err(e) if attempt < self.retries => {
                    warn!(url, attempt, error = %e, "request failed, retrying");
                    thread::sleep(self.backoff);
                }
                Err(source) => {
                    return Err(FetchError {
                        url: url.to_string(),
                        attempts: attempt,
                        source: source.into(),
                    })
                }
            }
        }
    }
}

/// Map a URL onto a file under `cache_dir`: scheme dropped, every path becomes
/// a directory holding an `index` file (with or without a trailing slash), and
/// the query string is kept in the file name.
fn url_to_cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let stripped = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
        .unwrap_or(base);

    let mut relative = stripped.trim_end_matches('/').to_string();
    relative.push_str("/index");
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        relative.push('?');
        relative.push_str(&query.replace('/', "%2F"));
    }
    cache_dir.join(relative)
}
