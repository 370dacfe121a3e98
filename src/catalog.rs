//! The crawl sources the tool knows about and how each is laid out on disk.

use crate::config::Settings;
use crate::crawl::{CategoryApiListing, ExploreListing, Listing, RegionApiListing, Top250Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Top250,
    Classic,
    HighRating,
    Chinese,
    Western,
    Japanese,
    Hongkong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingKind {
    Top250,
    Explore,
    Category(&'static str),
    Region(&'static str),
}

/// Static description of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    pub label: &'static str,
    /// File stem shared by the source's `.jsonl`, `.json` and `.csv` outputs
    pub stem: &'static str,
    pub category: Option<&'static str>,
    /// Clear the JSONL and CSV outputs before crawling
    pub fresh_start: bool,
    kind: ListingKind,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Top250,
        Source::Classic,
        Source::HighRating,
        Source::Chinese,
        Source::Western,
        Source::Japanese,
        Source::Hongkong,
    ];

    pub fn spec(self) -> SourceSpec {
        match self {
            Source::Top250 => SourceSpec {
                label: "豆瓣电影 Top 250",
                stem: "douban_top250",
                category: None,
                fresh_start: true,
                kind: ListingKind::Top250,
            },
            Source::Classic => SourceSpec {
                label: "经典电影",
                stem: "douban_classic_movies",
                category: Some("经典电影"),
                fresh_start: false,
                kind: ListingKind::Explore,
            },
            Source::HighRating => SourceSpec {
                label: "高分电影",
                stem: "douban_high_rating",
                category: Some("高分电影"),
                fresh_start: false,
                kind: ListingKind::Category("豆瓣高分"),
            },
            Source::Chinese => region("华语电影", "douban_chinese_movies", "华语"),
            Source::Western => region("欧美电影", "douban_western_movies", "欧美"),
            Source::Japanese => region("日本电影", "douban_japanese_movies", "日本"),
            Source::Hongkong => region("香港电影", "douban_hongkong_movies", "中国香港"),
        }
    }

    pub fn listing(self) -> Box<dyn Listing> {
        match self.spec().kind {
            ListingKind::Top250 => Box::new(Top250Listing),
            ListingKind::Explore => Box::new(ExploreListing),
            ListingKind::Category(category) => Box::new(CategoryApiListing {
                category: category.to_string(),
            }),
            ListingKind::Region(region) => Box::new(RegionApiListing {
                region: region.to_string(),
            }),
        }
    }

    /// Page bound from the settings for this kind of listing.
    pub fn default_pages(self, settings: &Settings) -> u32 {
        match self.spec().kind {
            ListingKind::Top250 => settings.top250_pages,
            ListingKind::Explore => 1,
            ListingKind::Category(_) | ListingKind::Region(_) => settings.api_pages,
        }
    }
}

fn region(label: &'static str, stem: &'static str, region: &'static str) -> SourceSpec {
    SourceSpec {
        label,
        stem,
        category: Some(label),
        fresh_start: false,
        kind: ListingKind::Region(region),
    }
}

/// Numbered menu entries, as shown to the user.
pub const MENU: [(&str, &str); 7] = [
    ("1", "豆瓣电影 Top 250"),
    ("2", "高分电影"),
    ("3", "华语电影"),
    ("4", "欧美电影"),
    ("5", "日本电影"),
    ("6", "香港电影"),
    ("7", "全部爬取 (1-6, 跨来源去重)"),
];

/// Sources for a menu choice. Blank input picks the first entry.
pub fn menu_selection(choice: &str) -> Option<Vec<Source>> {
    let sources = match choice.trim() {
        "" | "1" => vec![Source::Top250],
        "2" => vec![Source::HighRating],
        "3" => vec![Source::Chinese],
        "4" => vec![Source::Western],
        "5" => vec![Source::Japanese],
        "6" => vec![Source::Hongkong],
        "7" => vec![
            Source::Top250,
            Source::HighRating,
            Source::Chinese,
            Source::Western,
            Source::Japanese,
            Source::Hongkong,
        ],
        _ => return None,
    };
    Some(sources)
}
