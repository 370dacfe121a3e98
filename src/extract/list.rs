//! List-page items: the Top 250 layout, loosely structured grid items, and
//! discovery of item containers on an unknown page.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::{absolutize, attr, element_text, joined_text, selector};
use crate::normalize::extract_digits;
use crate::types::RawMovie;

static NBG_LINK: Lazy<Selector> = Lazy::new(|| selector("a.nbg"));
static PIC_LINK: Lazy<Selector> = Lazy::new(|| selector("div.pic a"));
static HD_LINK: Lazy<Selector> = Lazy::new(|| selector("div.hd a"));
static HD_TITLE: Lazy<Selector> = Lazy::new(|| selector("div.hd span.title"));
static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static RATING_NUM: Lazy<Selector> = Lazy::new(|| selector("span.rating_num"));
static STAR_SPAN: Lazy<Selector> = Lazy::new(|| selector("div.star span"));
static INFO_P: Lazy<Selector> = Lazy::new(|| selector("div.bd p"));

static ANY_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static TITLE_SPANS: Lazy<[Selector; 2]> =
    Lazy::new(|| [selector("span.title"), selector("span.pl2")]);
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static GRID_RATINGS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        selector("span.rating_nums"),
        selector("span.rating_num"),
        selector("span.rating"),
    ]
});
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));

static ITEM_CONTAINERS: Lazy<[Selector; 5]> = Lazy::new(|| {
    [
        selector("tr.item"),
        selector("div.item"),
        selector("li.clearfix"),
        selector(r#"div[class*="item"]"#),
        selector(r#"li[class*="item"]"#),
    ]
});
static TOP250_ENTRY: Lazy<Selector> = Lazy::new(|| selector("div.item"));
static SUBJECT_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="/subject/"]"#));

const MIN_YEAR: u32 = 1900;
const MAX_YEAR: u32 = 2100;

/// Parse one Top 250 style list item. `None` when no title can be found.
pub fn extract_list_item(item: ElementRef) -> Option<RawMovie> {
    let anchor = [&*NBG_LINK, &*PIC_LINK, &*HD_LINK]
        .iter()
        .find_map(|sel| item.select(sel).find(|a| attr(*a, "href").is_some()));

    let title = item
        .select(&HD_TITLE)
        .map(element_text)
        .find(|t| !t.is_empty())
        .or_else(|| anchor.map(element_text).filter(|t| !t.is_empty()))
        .or_else(|| anchor.and_then(|a| attr(a, "title")).map(String::from))
        .or_else(|| item.select(&IMG).find_map(|img| attr(img, "alt")).map(String::from))?;

    let mut movie = RawMovie {
        title: Some(title),
        link: anchor.and_then(|a| attr(a, "href")).map(absolutize),
        poster: item.select(&IMG).next().and_then(|img| {
            attr(img, "src")
                .or_else(|| attr(img, "data-src"))
                .map(String::from)
        }),
        rating: Some(Value::from(
            item.select(&RATING_NUM)
                .next()
                .map(|r| parse_rating(&element_text(r)))
                .unwrap_or(0.0),
        )),
        total_ratings: Some(Value::from(
            item.select(&STAR_SPAN)
                .last()
                .and_then(|span| extract_digits(&element_text(span)))
                .unwrap_or(0),
        )),
        ..Default::default()
    };

    let info = item
        .select(&INFO_P)
        .find(|p| p.value().attr("class").map_or(true, |c| c.trim().is_empty()));
    if let Some(info) = info {
        apply_info_line(&mut movie, &joined_text(info, " / "));
    }

    Some(movie)
}

/// Pull people and the release year out of a line like
/// `导演: 弗兰克·德拉邦特 主演: 蒂姆·罗宾斯 / 1994 / 美国 / 犯罪 剧情`.
fn apply_info_line(movie: &mut RawMovie, line: &str) {
    for part in line.split('/').map(str::trim) {
        if part.contains("导演") {
            match part.split_once("主演") {
                Some((directors, actors)) => {
                    movie.directors = Some(strip_marker(directors, "导演"));
                    movie.actors = Some(strip_marker(actors, ""));
                }
                None => movie.directors = Some(strip_marker(part, "导演")),
            }
        } else if part.contains("主演") {
            movie.actors = Some(strip_marker(part, "主演"));
        } else if let Some(year) = as_year(part) {
            movie.release_date = Some(year.to_string());
        }
    }
}

fn strip_marker(text: &str, marker: &str) -> String {
    let text = if marker.is_empty() {
        text.to_string()
    } else {
        text.replace(marker, "")
    };
    text.trim()
        .trim_start_matches([':', '：'])
        .trim()
        .to_string()
}

fn as_year(part: &str) -> Option<u32> {
    if part.len() != 4 || !part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    part.parse()
        .ok()
        .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

fn parse_rating(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .unwrap_or(0.0)
}

/// Parse a loosely structured grid item, as found on the explore page.
pub fn extract_generic_item(item: ElementRef) -> Option<RawMovie> {
    let mut movie = RawMovie::default();

    if let Some(anchor) = item.select(&ANY_LINK).find(|a| attr(*a, "href").is_some()) {
        movie.link = attr(anchor, "href").map(absolutize);
        movie.title = Some(element_text(anchor))
            .filter(|t| !t.is_empty())
            .or_else(|| attr(anchor, "title").map(String::from));
    }

    if movie.title.is_none() {
        movie.title = item
            .select(&IMG)
            .find_map(|img| attr(img, "alt"))
            .map(String::from);
    }

    if let Some(anchor) = TITLE_SPANS
        .iter()
        .find_map(|sel| item.select(sel).next())
        .and_then(|span| span.select(&ANCHOR).next())
    {
        movie.title = Some(element_text(anchor));
        if let Some(href) = attr(anchor, "href") {
            movie.link = Some(absolutize(href));
        }
    }

    let rating = GRID_RATINGS
        .iter()
        .find_map(|sel| item.select(sel).next())
        .map(|r| parse_rating(&element_text(r)))
        .unwrap_or(0.0);
    movie.rating = Some(Value::from(rating));

    let people = item
        .select(&SPAN)
        .map(element_text)
        .find(|t| t.contains("人评价"));
    movie.total_ratings = Some(Value::from(
        people.and_then(|p| extract_digits(&p)).unwrap_or(0),
    ));

    movie.title.as_deref().is_some_and(|t| !t.is_empty()).then_some(movie)
}

/// Entries of a Top 250 page. Sidebars and ads never match.
pub fn find_top250_items(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&TOP250_ENTRY).collect()
}

/// Locate item containers, trying progressively looser layouts.
pub fn find_movie_items(doc: &Html) -> Vec<ElementRef<'_>> {
    for sel in ITEM_CONTAINERS.iter() {
        let items: Vec<_> = doc.select(sel).collect();
        if !items.is_empty() {
            return items;
        }
    }

    let mut containers: Vec<ElementRef> = Vec::new();
    for link in doc.select(&SUBJECT_LINK) {
        let parent = link
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "div" | "li" | "tr"));
        if let Some(parent) = parent {
            if !containers.contains(&parent) {
                containers.push(parent);
            }
        }
    }
    containers
}
