//! Field normalization: turns whatever an extractor produced into a
//! canonical [`MovieRecord`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::{MovieRecord, RawMovie};

/// Keys that never reach the output.
const STRIPPED_KEYS: &[&str] = &[
    "rank",
    "other_titles",
    "also_known_as",
    "rating_5star",
    "rating_4star",
    "rating_3star",
    "rating_2star",
    "rating_1star",
    "quote",
    "info",
    "category",
    "rating_detail",
    "release_year",
    "people",
    "release_dates",
];

const MAX_ACTORS: usize = 5;
const MAX_FACT_CHARS: usize = 200;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid digit regex"));
static SUBJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/subject/(\d+)/").expect("Invalid subject regex"));
static FULL_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{1,2}-\d{1,2}").expect("Invalid date regex"));
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{1,2}").expect("Invalid year-month regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("Invalid year regex"));

/// Normalize a raw record. Total and deterministic; applying it to its own
/// output changes nothing.
pub fn normalize(raw: RawMovie) -> MovieRecord {
    let RawMovie {
        movie_id,
        title,
        rating,
        people,
        total_ratings,
        directors,
        actors,
        screenwriters,
        release_date,
        release_dates,
        genres,
        countries,
        languages,
        runtime,
        summary,
        tags,
        imdb,
        link,
        category,
        poster,
        rating_detail: _,
        mut extra,
    } = raw;

    let release_year = extra.get("release_year").and_then(value_text);
    extra.retain(|key, _| !STRIPPED_KEYS.contains(&key.as_str()));

    let release_date = resolve_release_date(release_date, release_dates.as_deref(), release_year);

    MovieRecord {
        movie_id: coerce_movie_id(movie_id.as_ref(), link.as_deref()),
        title,
        rating: coerce_rating(rating.as_ref()),
        total_ratings: coerce_total_ratings(people.as_deref(), total_ratings.as_ref()),
        directors: directors.map(|d| truncate_names(d, 1)),
        actors: actors.map(|a| truncate_names(a, MAX_ACTORS)),
        screenwriters: screenwriters.map(|s| truncate_names(s, 1)),
        release_date,
        genres,
        countries: countries.map(clear_polluted),
        languages: languages.map(clear_polluted),
        runtime,
        summary,
        tags,
        imdb,
        link,
        category,
        poster,
        extra,
    }
}

/// First digit run of `text` once ASCII and full-width commas are removed.
///
/// `"3,225,399人评价"` gives `Some(3225399)`.
pub fn extract_digits(text: &str) -> Option<u64> {
    let cleaned = text.replace([',', '，'], "");
    DIGIT_RUN
        .find(&cleaned)
        .and_then(|m| m.as_str().parse().ok())
}

/// Subject id embedded in a detail link.
pub fn movie_id_from_link(link: &str) -> Option<u64> {
    SUBJECT_ID
        .captures(link)
        .and_then(|caps| caps[1].parse().ok())
}

/// Reduce one release entry such as `1994-09-10(多伦多电影节)` to the most
/// precise date it carries.
pub fn collapse_release_date(entry: &str) -> Option<String> {
    [&*FULL_DATE, &*YEAR_MONTH, &*YEAR]
        .iter()
        .find_map(|re| re.find(entry))
        .map(|m| m.as_str().to_string())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate_names(names: String, limit: usize) -> String {
    let kept: Vec<&str> = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .take(limit)
        .collect();
    if kept.is_empty() {
        names
    } else {
        kept.join(", ")
    }
}

fn coerce_rating(value: Option<&Value>) -> f64 {
    let rating = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if rating.is_finite() {
        rating
    } else {
        0.0
    }
}

fn coerce_total_ratings(people: Option<&str>, total: Option<&Value>) -> u64 {
    if let Some(people) = people.filter(|p| !p.is_empty()) {
        return extract_digits(people).unwrap_or(0);
    }
    match total {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        Some(Value::String(s)) => extract_digits(s).unwrap_or(0),
        _ => 0,
    }
}

fn coerce_movie_id(value: Option<&Value>, link: Option<&str>) -> u64 {
    let existing = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    };
    existing
        .filter(|id| *id > 0)
        .or_else(|| link.and_then(movie_id_from_link))
        .unwrap_or(0)
}

/// Blank out a country or language value that swallowed neighbouring labels.
fn clear_polluted(text: String) -> String {
    if text.contains("导演") || text.contains("主演") || text.chars().count() > MAX_FACT_CHARS {
        String::new()
    } else {
        text
    }
}

fn resolve_release_date(
    current: Option<String>,
    release_dates: Option<&str>,
    release_year: Option<String>,
) -> Option<String> {
    let collapsed = release_dates
        .and_then(|dates| dates.split(',').map(str::trim).find(|d| !d.is_empty()))
        .and_then(collapse_release_date);

    collapsed
        .or(current)
        .filter(|d| !d.trim().is_empty())
        .or_else(|| release_year.filter(|y| !y.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn raw_with_link(link: &str) -> RawMovie {
        RawMovie {
            title: Some("肖申克的救赎".into()),
            link: Some(link.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_truncates_people_fields() {
        let raw = RawMovie {
            actors: Some("蒂姆·罗宾斯, 摩根·弗里曼,  , 鲍勃·冈顿,威廉姆·赛德勒,克兰西·布朗,吉尔·贝罗斯".into()),
            directors: Some("弗兰克·德拉邦特, 某人".into()),
            screenwriters: Some(" 斯蒂芬·金 ,弗兰克·德拉邦特".into()),
            ..Default::default()
        };
        let record = normalize(raw);
        assert_eq!(
            record.actors.as_deref(),
            Some("蒂姆·罗宾斯, 摩根·弗里曼, 鲍勃·冈顿, 威廉姆·赛德勒, 克兰西·布朗")
        );
        assert_eq!(record.directors.as_deref(), Some("弗兰克·德拉邦特"));
        assert_eq!(record.screenwriters.as_deref(), Some("斯蒂芬·金"));
    }

    #[test]
    fn test_rating_is_always_a_float() {
        let cases = [
            (None, 0.0),
            (Some(json!("")), 0.0),
            (Some(json!("   ")), 0.0),
            (Some(json!("暂无评分")), 0.0),
            (Some(json!("NaN")), 0.0),
            (Some(json!("inf")), 0.0),
            (Some(json!(" 9.7 ")), 9.7),
            (Some(json!(8)), 8.0),
            (Some(json!(null)), 0.0),
        ];
        for (input, expected) in cases {
            let raw = RawMovie {
                rating: input.clone(),
                ..Default::default()
            };
            assert_eq!(normalize(raw).rating, expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_people_text_becomes_total_ratings() {
        let raw = RawMovie {
            people: Some("3,225,399人评价".into()),
            total_ratings: Some(json!(12)),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 3225399);

        let raw = RawMovie {
            people: Some("1，234人评价".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 1234);

        let raw = RawMovie {
            people: Some("尚未上映".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 0);
    }

    #[test]
    fn test_total_ratings_without_people() {
        let raw = RawMovie::default();
        assert_eq!(normalize(raw).total_ratings, 0);

        let raw = RawMovie {
            total_ratings: Some(json!("45,678")),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 45678);

        let raw = RawMovie {
            total_ratings: Some(json!(987)),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 987);

        let raw = RawMovie {
            total_ratings: Some(json!(-3)),
            ..Default::default()
        };
        assert_eq!(normalize(raw).total_ratings, 0);
    }

    #[test]
    fn test_movie_id_resolution() {
        let record = normalize(raw_with_link("https://movie.douban.com/subject/1292052/"));
        assert_eq!(record.movie_id, 1292052);

        let mut raw = raw_with_link("https://movie.douban.com/subject/1292052/");
        raw.movie_id = Some(json!("1291546"));
        assert_eq!(normalize(raw).movie_id, 1291546);

        let mut raw = raw_with_link("https://movie.douban.com/subject/1292052/");
        raw.movie_id = Some(json!("abc"));
        assert_eq!(normalize(raw).movie_id, 1292052);

        let mut raw = raw_with_link("https://movie.douban.com/celebrity/1054521/");
        raw.movie_id = Some(json!(0));
        assert_eq!(normalize(raw).movie_id, 0);
    }

    #[test]
    fn test_release_date_collapse() {
        let raw = RawMovie {
            release_dates: Some("1994-09-10(多伦多电影节), 1994-09-23(加拿大)".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).release_date.as_deref(), Some("1994-09-10"));

        let raw = RawMovie {
            release_dates: Some("1994(日本)".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).release_date.as_deref(), Some("1994"));

        let raw = RawMovie {
            release_dates: Some("2001-7(中国台湾)".into()),
            release_date: Some("2001".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).release_date.as_deref(), Some("2001-7"));

        let raw = RawMovie {
            release_date: Some("".into()),
            ..Default::default()
        };
        assert_eq!(normalize(raw).release_date, None);
    }

    #[test]
    fn test_release_year_fills_missing_date() {
        let mut extra = Map::new();
        extra.insert("release_year".into(), json!(1993));
        let raw = RawMovie {
            extra,
            ..Default::default()
        };
        let record = normalize(raw);
        assert_eq!(record.release_date.as_deref(), Some("1993"));
        assert!(!record.extra.contains_key("release_year"));
    }

    #[test]
    fn test_polluted_countries_are_cleared() {
        let raw = RawMovie {
            countries: Some("美国 导演: 弗兰克·德拉邦特".into()),
            languages: Some("英语".into()),
            ..Default::default()
        };
        let record = normalize(raw);
        assert_eq!(record.countries.as_deref(), Some(""));
        assert_eq!(record.languages.as_deref(), Some("英语"));

        let raw = RawMovie {
            languages: Some("语".repeat(201)),
            ..Default::default()
        };
        assert_eq!(normalize(raw).languages.as_deref(), Some(""));

        let raw = RawMovie {
            languages: Some("语".repeat(200)),
            ..Default::default()
        };
        assert_eq!(normalize(raw).languages.map(|l| l.chars().count()), Some(200));
    }

    #[test]
    fn test_strips_debug_fields() {
        let mut extra = Map::new();
        extra.insert("rank".into(), json!(1));
        extra.insert("quote".into(), json!("希望让人自由。"));
        extra.insert("rating_5star".into(), json!("85%"));
        extra.insert("category".into(), json!("debug"));
        extra.insert("box_office".into(), json!("2800万"));
        let raw = RawMovie {
            category: Some("华语电影".into()),
            extra,
            ..Default::default()
        };
        let record = normalize(raw);
        let keys: Vec<&String> = record.extra.keys().collect();
        assert_eq!(keys, vec!["box_office"]);
        assert_eq!(record.category.as_deref(), Some("华语电影"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut extra = Map::new();
        extra.insert("rank".into(), json!(1));
        extra.insert("box_office".into(), json!("2800万"));
        let raw = RawMovie {
            title: Some("霸王别姬".into()),
            link: Some("https://movie.douban.com/subject/1291546/".into()),
            rating: Some(json!("9.6")),
            people: Some("2,233,475人评价".into()),
            actors: Some("张国荣,张丰毅,巩俐,葛优,英达,蒋雯丽".into()),
            directors: Some("陈凯歌".into()),
            release_dates: Some("1993-07-26(中国香港), 1993-01-01(中国大陆)".into()),
            countries: Some("中国大陆 / 中国香港".into()),
            extra,
            ..Default::default()
        };
        let once = normalize(raw);
        let twice = normalize(RawMovie::from(&once));
        assert_eq!(once, twice);
        assert_eq!(once.movie_id, 1291546);
        assert_eq!(once.total_ratings, 2233475);
        assert_eq!(once.release_date.as_deref(), Some("1993-07-26"));
    }

    #[test]
    fn test_extract_digits() {
        assert_eq!(extract_digits("3,225,399人评价"), Some(3225399));
        assert_eq!(extract_digits("(12，345人评价)"), Some(12345));
        assert_eq!(extract_digits("少于10人评价"), Some(10));
        assert_eq!(extract_digits("暂无"), None);
    }
}
