use serde::{Deserialize, Serialize};

use super::MediaType;

/// Lightweight catalog projection served by list endpoints and caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCard {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub media_type: MediaType,
}

/// Search result card carrying the provider relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCard {
    #[serde(flatten)]
    pub card: MediaCard,
    pub score: f64,
}

/// Front-page slider entry: metadata-lite, backdrop-oriented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroItem {
    pub id: i64,
    pub title: String,
    pub media_type: MediaType,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub logo: String,
}

/// Year parsed from the leading four characters of a release date.
#[must_use]
pub fn year_of(release_date: Option<&str>) -> Option<i32> {
    release_date
        .and_then(|d| d.split('-').next())
        .and_then(|y| y.parse::<i32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_from_release_date() {
        assert_eq!(year_of(Some("2019-07-04")), Some(2019));
        assert_eq!(year_of(Some("1999")), Some(1999));
        assert_eq!(year_of(Some("")), None);
        assert_eq!(year_of(Some("unknown")), None);
        assert_eq!(year_of(None), None);
    }
}
