//! Movie record types: the loose pre-normalization shape and the canonical one.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Serialization order shared by all three output formats.
/// Fields outside this list follow in the order they were first seen.
pub const FIELD_ORDER: &[&str] = &[
    // identity
    "movie_id",
    "title",
    // rating
    "rating",
    "total_ratings",
    // people
    "directors",
    "actors",
    "screenwriters",
    // film facts
    "release_date",
    "genres",
    "countries",
    "languages",
    "runtime",
    // content
    "summary",
    "tags",
    // misc
    "imdb",
    "link",
    "category",
    "box_office",
    // poster last
    "poster",
];

/// Rating sub-object scraped from a detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingDetail {
    /// Raw text of the average score, e.g. "9.7"
    pub average: Option<String>,
    pub total_ratings: Option<u64>,
}

/// Fields a detail page can contribute to a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailInfo {
    pub poster: Option<String>,
    pub directors: Option<String>,
    pub actors: Option<String>,
    pub screenwriters: Option<String>,
    pub genres: Option<String>,
    pub countries: Option<String>,
    pub languages: Option<String>,
    /// Comma separated release entries, one per exhibition region
    pub release_dates: Option<String>,
    pub runtime: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub imdb: Option<String>,
    pub rating_detail: Option<RatingDetail>,
}

/// A record as produced by the extractors, before normalization.
///
/// Numeric fields are kept as JSON values because sources hand them over
/// either as numbers or as free text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMovie {
    pub movie_id: Option<Value>,
    pub title: Option<String>,
    pub rating: Option<Value>,
    /// Free-text rating count such as "3,225,399人评价"
    pub people: Option<String>,
    pub total_ratings: Option<Value>,
    pub directors: Option<String>,
    pub actors: Option<String>,
    pub screenwriters: Option<String>,
    pub release_date: Option<String>,
    pub release_dates: Option<String>,
    pub genres: Option<String>,
    pub countries: Option<String>,
    pub languages: Option<String>,
    pub runtime: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub imdb: Option<String>,
    pub link: Option<String>,
    /// Crawl-source label stamped by a driver
    pub category: Option<String>,
    pub poster: Option<String>,
    pub rating_detail: Option<RatingDetail>,
    pub extra: Map<String, Value>,
}

impl RawMovie {
    /// Dedup key: trimmed link, or trimmed title when the link is empty.
    pub fn dedup_key(&self) -> String {
        let link = self.link.as_deref().map(str::trim).unwrap_or("");
        if !link.is_empty() {
            return link.to_string();
        }
        self.title
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .to_string()
    }
}

/// Canonical, normalized movie record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieRecord {
    pub movie_id: u64,
    pub title: Option<String>,
    pub rating: f64,
    pub total_ratings: u64,
    pub directors: Option<String>,
    pub actors: Option<String>,
    pub screenwriters: Option<String>,
    pub release_date: Option<String>,
    pub genres: Option<String>,
    pub countries: Option<String>,
    pub languages: Option<String>,
    pub runtime: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub imdb: Option<String>,
    pub link: Option<String>,
    pub category: Option<String>,
    pub poster: Option<String>,
    /// Fields outside the typed schema, in encounter order
    pub extra: Map<String, Value>,
}

impl MovieRecord {
    pub fn title_or_unknown(&self) -> &str {
        self.title.as_deref().unwrap_or("未知")
    }

    fn typed_field(&self, name: &str) -> Option<Value> {
        let text = |v: &Option<String>| v.as_ref().map(|s| Value::String(s.clone()));
        match name {
            "movie_id" => Some(Value::from(self.movie_id)),
            "title" => text(&self.title),
            "rating" => Some(Value::from(self.rating)),
            "total_ratings" => Some(Value::from(self.total_ratings)),
            "directors" => text(&self.directors),
            "actors" => text(&self.actors),
            "screenwriters" => text(&self.screenwriters),
            "release_date" => text(&self.release_date),
            "genres" => text(&self.genres),
            "countries" => text(&self.countries),
            "languages" => text(&self.languages),
            "runtime" => text(&self.runtime),
            "summary" => text(&self.summary),
            "tags" => text(&self.tags),
            "imdb" => text(&self.imdb),
            "link" => text(&self.link),
            "category" => text(&self.category),
            "poster" => text(&self.poster),
            _ => None,
        }
    }

    /// Present fields in canonical order, extras appended in encounter order.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for name in FIELD_ORDER {
            let value = self
                .typed_field(name)
                .or_else(|| self.extra.get(*name).cloned());
            if let Some(value) = value {
                map.insert(name.to_string(), value);
            }
        }
        for (key, value) in &self.extra {
            if !map.contains_key(key) && self.typed_field(key).is_none() {
                map.insert(key.clone(), value.clone());
            }
        }
        map
    }
}

impl Serialize for MovieRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl From<&MovieRecord> for RawMovie {
    fn from(record: &MovieRecord) -> Self {
        RawMovie {
            movie_id: Some(Value::from(record.movie_id)),
            title: record.title.clone(),
            rating: Some(Value::from(record.rating)),
            people: None,
            total_ratings: Some(Value::from(record.total_ratings)),
            directors: record.directors.clone(),
            actors: record.actors.clone(),
            screenwriters: record.screenwriters.clone(),
            release_date: record.release_date.clone(),
            release_dates: None,
            genres: record.genres.clone(),
            countries: record.countries.clone(),
            languages: record.languages.clone(),
            runtime: record.runtime.clone(),
            summary: record.summary.clone(),
            tags: record.tags.clone(),
            imdb: record.imdb.clone(),
            link: record.link.clone(),
            category: record.category.clone(),
            poster: record.poster.clone(),
            rating_detail: None,
            extra: record.extra.clone(),
        }
    }
}
