//! Detail-page fields layered over a list record.

use serde_json::Value;

use crate::types::{DetailInfo, RawMovie};

/// Overlay detail-page fields onto a base record.
///
/// A detail field only wins when it carries text, so a sparse detail page
/// never erases what the listing already provided.
pub fn merge(mut base: RawMovie, detail: DetailInfo) -> RawMovie {
    let DetailInfo {
        poster,
        directors,
        actors,
        screenwriters,
        genres,
        countries,
        languages,
        release_dates,
        runtime,
        summary,
        tags,
        imdb,
        rating_detail,
    } = detail;

    overwrite(&mut base.poster, poster);
    overwrite(&mut base.directors, directors);
    overwrite(&mut base.actors, actors);
    overwrite(&mut base.screenwriters, screenwriters);
    overwrite(&mut base.genres, genres);
    overwrite(&mut base.countries, countries);
    overwrite(&mut base.languages, languages);
    overwrite(&mut base.release_dates, release_dates);
    overwrite(&mut base.runtime, runtime);
    overwrite(&mut base.summary, summary);
    overwrite(&mut base.tags, tags);
    overwrite(&mut base.imdb, imdb);

    if let Some(rating) = rating_detail {
        let average = rating
            .average
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .and_then(|a| a.parse::<f64>().ok())
            .filter(|a| a.is_finite() && *a != 0.0);
        if let Some(average) = average {
            base.rating = Some(Value::from(average));
        }

        if let Some(count) = rating.total_ratings.filter(|c| *c > 0) {
            base.total_ratings = Some(Value::from(count));
            // the listing's free-text count would otherwise win during normalization
            base.people = None;
        }
    }

    base
}

fn overwrite(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *slot = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::RatingDetail;
    use serde_json::json;

    fn base() -> RawMovie {
        RawMovie {
            title: Some("千与千寻".into()),
            link: Some("https://movie.douban.com/subject/1291561/".into()),
            rating: Some(json!("9.4")),
            people: Some("2,100,000人评价".into()),
            directors: Some("宫崎骏".into()),
            poster: Some("https://img.example/list.jpg".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_non_empty_detail_fields_win() {
        let detail = DetailInfo {
            poster: Some("https://img.example/detail.jpg".into()),
            directors: Some("".into()),
            genres: Some("剧情 / 动画 / 奇幻".into()),
            summary: Some("千寻和爸爸妈妈一同驱车前往新家".into()),
            ..Default::default()
        };
        let merged = merge(base(), detail);
        assert_eq!(merged.poster.as_deref(), Some("https://img.example/detail.jpg"));
        assert_eq!(merged.directors.as_deref(), Some("宫崎骏"));
        assert_eq!(merged.genres.as_deref(), Some("剧情 / 动画 / 奇幻"));
        assert_eq!(merged.summary.as_deref(), Some("千寻和爸爸妈妈一同驱车前往新家"));
    }

    #[test]
    fn test_rating_detail_overrides() {
        let detail = DetailInfo {
            rating_detail: Some(RatingDetail {
                average: Some("9.5".into()),
                total_ratings: Some(2234567),
            }),
            ..Default::default()
        };
        let merged = merge(base(), detail);
        assert_eq!(merged.rating, Some(json!(9.5)));
        assert_eq!(merged.people, None);

        let record = normalize(merged);
        assert_eq!(record.rating, 9.5);
        assert_eq!(record.total_ratings, 2234567);
    }

    #[test]
    fn test_unusable_rating_detail_keeps_prior_values() {
        let detail = DetailInfo {
            rating_detail: Some(RatingDetail {
                average: Some("暂无评分".into()),
                total_ratings: Some(0),
            }),
            ..Default::default()
        };
        let record = normalize(merge(base(), detail));
        assert_eq!(record.rating, 9.4);
        assert_eq!(record.total_ratings, 2100000);

        let detail = DetailInfo {
            rating_detail: Some(RatingDetail {
                average: Some("0.0".into()),
                total_ratings: None,
            }),
            ..Default::default()
        };
        assert_eq!(normalize(merge(base(), detail)).rating, 9.4);
    }
}
