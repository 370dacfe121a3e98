//! JSON API items from the category and region endpoints.

use serde_json::Value;

use crate::config::BASE_URL;
use crate::error::ItemError;
use crate::types::RawMovie;

const UNTITLED: &str = "未知";

/// Items of an API page: the first non-empty of `items`, `subjects`, `data`.
pub fn page_items(payload: &Value) -> &[Value] {
    ["items", "subjects", "data"]
        .iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_array))
        .find(|items| !items.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Convert one API item. Unlike HTML items, a bad identifier drops the item.
pub fn extract_api_item(item: &Value) -> Result<RawMovie, ItemError> {
    let raw_id = identifier(item).ok_or(ItemError::MissingIdentifier)?;
    let movie_id: u64 = raw_id
        .parse()
        .map_err(|_| ItemError::InvalidIdentifier(raw_id.clone()))?;

    let title = item
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED);

    let (rating, total_ratings) = match item.get("rating") {
        Some(Value::Object(rating)) => (
            rating.get("value").and_then(number_f64).unwrap_or(0.0),
            rating.get("count").and_then(number_u64).unwrap_or(0),
        ),
        Some(value) => (number_f64(value).unwrap_or(0.0), 0),
        None => (0.0, 0),
    };

    Ok(RawMovie {
        movie_id: Some(Value::from(movie_id)),
        title: Some(title.to_string()),
        rating: Some(Value::from(rating)),
        total_ratings: Some(Value::from(total_ratings)),
        link: Some(format!("{}/subject/{}/", BASE_URL, raw_id)),
        poster: poster(item.get("pic")),
        ..Default::default()
    })
}

/// Identifier text from `uri` (`douban://…/movie/<id>` or `…/subject/<id>/`),
/// falling back to `id`.
fn identifier(item: &Value) -> Option<String> {
    let from_uri = item.get("uri").and_then(Value::as_str).and_then(|uri| {
        if let Some((_, id)) = uri.rsplit_once("movie/") {
            Some(id.to_string())
        } else {
            uri.rsplit_once("/subject/")
                .map(|(_, id)| id.trim_end_matches('/').to_string())
        }
    });

    let id = from_uri.or_else(|| match item.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })?;

    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

/// A number, or text holding one.
fn number_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn number_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn poster(pic: Option<&Value>) -> Option<String> {
    match pic? {
        Value::Object(pic) => ["large", "normal", "url"]
            .iter()
            .filter_map(|key| pic.get(*key).and_then(Value::as_str))
            .find(|url| !url.is_empty())
            .map(String::from),
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        _ => None,
    }
}
