use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{year_of, HeroItem, MediaCard, MediaType};

/// One physical file representing a movie or an episode at a specific
/// resolution/codec. `file_hash` is the 6-character prefix of the
/// upstream unique id; `(msg_id, chat_id)` locate the stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariant {
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
    pub audio: String,
    pub video_codec: String,
    pub file_type: String,
    pub subtitle: String,
    pub file_hash: String,
    pub msg_id: i64,
    pub chat_id: i64,
    /// Episode variants carry the runtime; movie variants do not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub character: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// Full movie document as persisted in the catalog store.
///
/// Fields observed on read but not modeled here are preserved in
/// `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub mid: i64,
    pub title: String,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub runtime: Option<i64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub studios: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub trailer: Option<String>,
    #[serde(default)]
    pub quality: Vec<QualityVariant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MovieRecord {
    /// Merge a freshly-enriched record into this stored one.
    ///
    /// Scalar metadata is overwritten wholesale; quality variants are
    /// appended without dedup unless `merge_by_type` is set, in which
    /// case a variant with the same `type` replaces the stored one.
    pub fn apply_update(&mut self, incoming: MovieRecord, merge_by_type: bool) {
        let MovieRecord {
            mid: _,
            title,
            original_title,
            release_date,
            overview,
            poster_path,
            backdrop_path,
            runtime,
            popularity,
            vote_average,
            vote_count,
            genres,
            cast,
            directors,
            studios,
            links,
            logo,
            trailer,
            quality,
            extra,
        } = incoming;

        self.title = title;
        self.original_title = original_title;
        self.release_date = release_date;
        self.overview = overview;
        self.poster_path = poster_path;
        self.backdrop_path = backdrop_path;
        self.runtime = runtime;
        self.popularity = popularity;
        self.vote_average = vote_average;
        self.vote_count = vote_count;
        self.genres = genres;
        self.cast = cast;
        self.directors = directors;
        self.studios = studios;
        self.links = links;
        self.logo = logo;
        self.trailer = trailer;

        for variant in quality {
            if merge_by_type {
                if let Some(existing) = self.quality.iter_mut().find(|q| q.kind == variant.kind) {
                    *existing = variant;
                    continue;
                }
            }
            self.quality.push(variant);
        }

        for (key, value) in extra {
            self.extra.insert(key, value);
        }
    }

    #[must_use]
    pub fn card(&self) -> MediaCard {
        MediaCard {
            id: self.mid,
            title: self.title.clone(),
            year: year_of(self.release_date.as_deref()),
            poster: self.poster_path.clone(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            media_type: MediaType::Movie,
        }
    }

    #[must_use]
    pub fn hero_item(&self) -> HeroItem {
        HeroItem {
            id: self.mid,
            title: self.title.clone(),
            media_type: MediaType::Movie,
            backdrop_path: self.backdrop_path.clone(),
            overview: self.overview.clone().unwrap_or_default(),
            release_date: self.release_date.clone().unwrap_or_default(),
            vote_average: self.vote_average.unwrap_or(0.0),
            genres: self.genres.clone(),
            logo: self.logo.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
pub(crate) fn variant(kind: &str) -> QualityVariant {
    QualityVariant {
        kind: kind.to_string(),
        size: "1.40GB".to_string(),
        audio: "English".to_string(),
        video_codec: "x264".to_string(),
        file_type: "matroska".to_string(),
        subtitle: "UTF-8".to_string(),
        file_hash: "AgADBQ".to_string(),
        msg_id: 100,
        chat_id: -1001234567890,
        runtime: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(mid: i64, kinds: &[&str]) -> MovieRecord {
        MovieRecord {
            mid,
            title: "Blade Runner".to_string(),
            original_title: "Blade Runner".to_string(),
            release_date: Some("1982-06-25".to_string()),
            overview: Some("A blade runner must pursue replicants.".to_string()),
            poster_path: Some("/poster.jpg".to_string()),
            backdrop_path: Some("/backdrop.jpg".to_string()),
            runtime: Some(117),
            popularity: Some(80.5),
            vote_average: Some(7.9),
            vote_count: Some(12000),
            genres: vec!["Science Fiction".to_string()],
            cast: vec![],
            directors: vec!["Ridley Scott".to_string()],
            studios: vec![],
            links: vec![],
            logo: None,
            trailer: None,
            quality: kinds.iter().map(|k| variant(k)).collect(),
            extra: Map::new(),
        }
    }

    #[test]
    fn update_appends_qualities_without_dedup() {
        let mut stored = movie(42, &["1080p"]);
        stored.apply_update(movie(42, &["1080p"]), false);
        assert_eq!(stored.quality.len(), 2);
        stored.apply_update(movie(42, &["720p"]), false);
        assert_eq!(stored.quality.len(), 3);
    }

    #[test]
    fn update_merges_qualities_by_type_when_enabled() {
        let mut stored = movie(42, &["1080p"]);
        let mut incoming = movie(42, &["1080p"]);
        incoming.quality[0].size = "2.00GB".to_string();
        stored.apply_update(incoming, true);
        assert_eq!(stored.quality.len(), 1);
        assert_eq!(stored.quality[0].size, "2.00GB");

        stored.apply_update(movie(42, &["720p"]), true);
        assert_eq!(stored.quality.len(), 2);
    }

    #[test]
    fn update_overwrites_scalar_metadata() {
        let mut stored = movie(42, &[]);
        let mut incoming = movie(42, &[]);
        incoming.vote_average = Some(8.2);
        incoming.overview = None;
        stored.apply_update(incoming, false);
        assert_eq!(stored.vote_average, Some(8.2));
        assert_eq!(stored.overview, None);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "mid": 7,
            "title": "Stalker",
            "quality": [],
            "observed_but_unspecified": {"nested": true}
        });
        let record: MovieRecord = serde_json::from_value(raw).unwrap();
        assert!(record.extra.contains_key("observed_but_unspecified"));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["observed_but_unspecified"]["nested"], true);
    }

    #[test]
    fn card_projects_year_from_release_date() {
        let card = movie(42, &[]).card();
        assert_eq!(card.year, Some(1982));
        assert_eq!(card.media_type, MediaType::Movie);
        assert_eq!(card.poster.as_deref(), Some("/poster.jpg"));
    }
}
