//! Detail page (`/subject/<id>/`) extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::{attr, collapse_whitespace, element_text, has_class, joined_text, non_empty, selector};
use crate::normalize::extract_digits;
use crate::types::{DetailInfo, RatingDetail};

static INFO: Lazy<Selector> = Lazy::new(|| selector("#info"));
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static DIRECTED_BY: Lazy<Selector> = Lazy::new(|| selector(r#"a[rel="v:directedBy"]"#));
static STARRING: Lazy<Selector> = Lazy::new(|| selector(r#"a[rel="v:starring"]"#));
static GENRE: Lazy<Selector> = Lazy::new(|| selector(r#"span[property="v:genre"]"#));
static RELEASE_DATE: Lazy<Selector> =
    Lazy::new(|| selector(r#"span[property="v:initialReleaseDate"]"#));
static RUNTIME: Lazy<Selector> = Lazy::new(|| selector(r#"span[property="v:runtime"]"#));
static IMDB_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="imdb.com"]"#));

static POSTERS: Lazy<[Selector; 4]> = Lazy::new(|| {
    [
        selector(r#"img[title]:not([title=""])"#),
        selector("a.nbgnbg img"),
        selector("#mainpic img"),
        selector("div.pic img"),
    ]
});
static RATING_AVERAGE: Lazy<Selector> = Lazy::new(|| selector("strong.rating_num"));
static RATING_PEOPLE: Lazy<Selector> = Lazy::new(|| selector("a.rating_people"));

static SUMMARY_CONTAINERS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        selector("#link-report-intra"),
        selector("#link-report"),
        selector("div.indent"),
    ]
});
static V_SUMMARY: Lazy<Selector> = Lazy::new(|| selector(r#"span[property="v:summary"]"#));
static INTRO_BLOCKS: Lazy<[Selector; 4]> = Lazy::new(|| {
    [
        selector("div.intro"),
        selector("div.summary"),
        selector("div.movie-summary"),
        selector("div.content"),
    ]
});
static SCRIPT: Lazy<Selector> = Lazy::new(|| selector("script"));
static LD_JSON: Lazy<Selector> =
    Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));

static TAG_REGIONS: Lazy<[Selector; 7]> = Lazy::new(|| {
    [
        selector("div.tags-body"),
        selector("#db-tags-section"),
        selector("div.tags"),
        selector("div.movie-tags"),
        selector("section.tags-section"),
        selector(r#"div[id*="tag"]"#),
        selector(r#"div[class*="tag"]"#),
    ]
});
static TAG_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="/tag/"]"#));

static SUMMARY_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(展开全部\)|展开全部|\(展开\)|\(收起\)|收起|©豆瓣").expect("Invalid noise regex")
});
static SCRIPT_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""summary":\s*"([^"]+)""#).expect("Invalid summary regex"));
static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"tt\d+").expect("Invalid IMDb regex"));

/// Labels that end the value of the previous label in the info block.
const INFO_LABELS: &[&str] = &[
    "导演",
    "编剧",
    "主演",
    "类型:",
    "制片国家/地区:",
    "语言:",
    "上映日期:",
    "片长:",
    "又名:",
    "IMDb:",
    "官方网站:",
];
const MAX_LABEL_VALUE_CHARS: usize = 200;

/// A summary at least this long is taken as the complete text.
const FULL_SUMMARY_CHARS: usize = 100;
const MIN_SPAN_SUMMARY_CHARS: usize = 50;

const TAG_DENYLIST: &[&str] = &["标签", "更多", "添加", "管理", "查看全部"];
const MAX_TAG_CHARS: usize = 50;
const PAGE_TAG_SCAN_LIMIT: usize = 30;
const MAX_TAGS: usize = 20;

pub fn extract_detail(html: &str) -> DetailInfo {
    let doc = Html::parse_document(html);
    let info = doc.select(&INFO).next();

    let mut detail = DetailInfo {
        poster: poster(&doc),
        rating_detail: rating_detail(&doc),
        summary: summary(&doc),
        tags: tags(&doc),
        ..Default::default()
    };

    if let Some(info) = info {
        detail.directors = linked_names(info, &DIRECTED_BY).or_else(|| labelled_people(info, "导演"));
        detail.screenwriters = labelled_people(info, "编剧");
        detail.actors = linked_names(info, &STARRING).or_else(|| labelled_people(info, "主演"));
        detail.genres = linked_names(info, &GENRE);
        detail.countries = label_value(info, "制片国家/地区");
        detail.languages = label_value(info, "语言");
        detail.release_dates = linked_names(info, &RELEASE_DATE);
        detail.runtime = info
            .select(&RUNTIME)
            .next()
            .map(element_text)
            .and_then(non_empty);
        detail.imdb = imdb(info);
    }

    detail
}

fn poster(doc: &Html) -> Option<String> {
    POSTERS
        .iter()
        .find_map(|sel| doc.select(sel).find_map(|img| attr(img, "src")))
        .map(String::from)
}

fn rating_detail(doc: &Html) -> Option<RatingDetail> {
    let average = doc
        .select(&RATING_AVERAGE)
        .next()
        .map(element_text)
        .and_then(non_empty);
    let total_ratings = doc
        .select(&RATING_PEOPLE)
        .next()
        .and_then(|a| extract_digits(&element_text(a)));

    if average.is_none() && total_ratings.is_none() {
        return None;
    }
    Some(RatingDetail {
        average,
        total_ratings,
    })
}

/// Texts of all matches joined with ", ".
fn linked_names(scope: ElementRef, sel: &Selector) -> Option<String> {
    let names: Vec<String> = scope
        .select(sel)
        .map(element_text)
        .filter(|n| !n.is_empty())
        .collect();
    non_empty(names.join(", "))
}

/// Text directly owned by an element, excluding descendants.
fn own_text(el: ElementRef) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| &**t))
        .collect()
}

fn label_spans<'a>(info: ElementRef<'a>, marker: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    info.select(&SPAN)
        .filter(move |span| own_text(*span).contains(marker))
}

/// Names listed after a label such as `编剧`: the label's enclosing element
/// links first, then the plain text value split on `/`.
fn labelled_people(info: ElementRef, marker: &str) -> Option<String> {
    let linked = label_spans(info, marker).find_map(|label| {
        let parent = label.parent().and_then(ElementRef::wrap)?;
        if parent == info {
            return None;
        }
        linked_names(parent, &ANCHOR)
    });

    linked.or_else(|| {
        label_value(info, marker).and_then(|value| {
            let names: Vec<&str> = value
                .split('/')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            non_empty(names.join(", "))
        })
    })
}

/// Plain-text value following a label inside the info block.
fn label_value(info: ElementRef, marker: &str) -> Option<String> {
    label_spans(info, marker).find_map(|label| {
        let parent = label.parent().and_then(ElementRef::wrap);
        label_text(&trailing_text(label), marker)
            .or_else(|| {
                parent
                    .filter(|p| *p != info)
                    .and_then(|p| label_text(&trailing_text(p), marker))
            })
            .or_else(|| {
                let full_text = joined_text(parent?, " ");
                let (_, rest) = full_text.split_once(marker)?;
                label_text(rest, marker)
            })
    })
}

/// Text of the siblings after `el`, up to the next line break or label.
fn trailing_text(el: ElementRef) -> String {
    let mut text = String::new();
    for node in el.next_siblings() {
        if let Some(t) = node.value().as_text() {
            text.push_str(t);
            continue;
        }
        if let Some(sibling) = ElementRef::wrap(node) {
            if sibling.value().name() == "br" || has_class(sibling, "pl") {
                break;
            }
            text.push_str(&sibling.text().collect::<String>());
        }
    }
    text
}

/// Clean the raw text after a label, cutting it at the next known label.
fn label_text(raw: &str, marker: &str) -> Option<String> {
    let rest = raw.trim_start().trim_start_matches([':', '：']);
    let end = INFO_LABELS
        .iter()
        .filter(|label| !label.starts_with(marker))
        .filter_map(|label| rest.find(label))
        .min()
        .unwrap_or(rest.len());
    let value = collapse_whitespace(&rest[..end]);
    if value.is_empty() || value.chars().count() >= MAX_LABEL_VALUE_CHARS {
        None
    } else {
        Some(value)
    }
}

fn imdb(info: ElementRef) -> Option<String> {
    info.select(&IMDB_LINK)
        .find_map(|a| attr(a, "href"))
        .map(String::from)
        .or_else(|| {
            let value = label_value(info, "IMDb")?;
            let id = IMDB_ID.find(&value)?;
            Some(format!("https://www.imdb.com/title/{}/", id.as_str()))
        })
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn clean_summary(text: &str) -> String {
    collapse_whitespace(&SUMMARY_NOISE.replace_all(text, ""))
}

fn summary(doc: &Html) -> Option<String> {
    let mut text = SUMMARY_CONTAINERS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(container_summary)
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(span) = doc.select(&V_SUMMARY).next() {
            text = clean_summary(&joined_text(span, " "));
        }
    }

    if char_len(&text) < FULL_SUMMARY_CHARS {
        let current = char_len(&text);
        let intro = INTRO_BLOCKS
            .iter()
            .filter_map(|sel| doc.select(sel).next())
            .map(|block| clean_summary(&joined_text(block, " ")))
            .find(|candidate| char_len(candidate) > current);
        if let Some(intro) = intro {
            text = intro;
        }
    }

    if char_len(&text) < FULL_SUMMARY_CHARS {
        let current = char_len(&text);
        let scripted = doc
            .select(&SCRIPT)
            .map(|script| script.text().collect::<String>())
            .filter(|body| body.to_lowercase().contains("summary"))
            .filter_map(|body| {
                SCRIPT_SUMMARY
                    .captures(&body)
                    .map(|caps| caps[1].to_string())
            })
            .find(|candidate| char_len(candidate) > current);
        if let Some(scripted) = scripted {
            text = scripted;
        }
    }

    non_empty(collapse_whitespace(&text))
}

/// Summary inside the report container, preferring the un-truncated variant.
fn container_summary(container: ElementRef) -> String {
    let mut text = container
        .select(&SPAN)
        .find(|span| has_class(*span, "all"))
        .map(|span| clean_summary(&joined_text(span, " ")))
        .unwrap_or_default();

    if char_len(&text) < FULL_SUMMARY_CHARS {
        if let Some(full) = container.select(&V_SUMMARY).find_map(full_summary_variant) {
            text = full;
        }
    }

    if char_len(&text) < FULL_SUMMARY_CHARS {
        let longest = container
            .select(&SPAN)
            .filter(|span| !has_class(*span, "short"))
            .map(|span| clean_summary(&joined_text(span, " ")))
            .filter(|candidate| char_len(candidate) >= MIN_SPAN_SUMMARY_CHARS)
            .max_by_key(|candidate| char_len(candidate));
        if let Some(longest) = longest.filter(|l| char_len(l) > char_len(&text)) {
            text = longest;
        }
    }

    text
}

/// Resolve a `v:summary` span to its complete text, following a truncated
/// `short` wrapper to its `all` sibling.
fn full_summary_variant(span: ElementRef) -> Option<String> {
    let parent = span.parent().and_then(ElementRef::wrap)?;
    if has_class(parent, "all") {
        return non_empty(clean_summary(&joined_text(span, " ")));
    }
    if has_class(parent, "short") {
        let all = parent
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|s| s.value().name() == "span" && has_class(*s, "all"))?;
        let inner = all.select(&V_SUMMARY).next().unwrap_or(all);
        return non_empty(clean_summary(&joined_text(inner, " ")));
    }
    None
}

fn tags(doc: &Html) -> Option<String> {
    let mut tags = TAG_REGIONS
        .iter()
        .filter_map(|sel| doc.select(sel).next())
        .map(|region| collect_tags(region.select(&TAG_LINK).map(element_text), &[], usize::MAX))
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    if tags.is_empty() {
        tags = collect_tags(
            doc.select(&TAG_LINK).map(element_text),
            TAG_DENYLIST,
            PAGE_TAG_SCAN_LIMIT,
        );
    }

    if tags.is_empty() {
        let keywords = doc
            .select(&LD_JSON)
            .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
            .flat_map(|data| ld_keywords(&data));
        tags = collect_tags(keywords, &[], usize::MAX);
    }

    tags.truncate(MAX_TAGS);
    non_empty(tags.join(", "))
}

/// Unique, short tag texts in encounter order.
fn collect_tags(texts: impl Iterator<Item = String>, deny: &[&str], limit: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for text in texts {
        let text = text.trim();
        if text.is_empty()
            || char_len(text) >= MAX_TAG_CHARS
            || deny.contains(&text)
            || tags.iter().any(|t| t == text)
        {
            continue;
        }
        tags.push(text.to_string());
        if tags.len() >= limit {
            break;
        }
    }
    tags
}

fn ld_keywords(data: &Value) -> Vec<String> {
    match data.get("keywords") {
        Some(Value::String(s)) => s.split(',').map(|k| k.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|k| !k.is_null())
            .map(|k| match k {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
