use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{year_of, CastMember, HeroItem, MediaCard, MediaType, QualityVariant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_number: i64,
    pub name: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub still_path: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub quality: Vec<QualityVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub season_number: i64,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Full show document as persisted in the catalog store.
///
/// The nested `season` list is merged structurally on upsert: seasons by
/// number, episodes by number, and episode qualities keyed by `type`
/// (replaced on collision).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowRecord {
    pub sid: i64,
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
    pub creators: Vec<String>,
    #[serde(default)]
    pub studios: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub trailer: Option<String>,
    #[serde(default)]
    pub season: Vec<Season>,
    #[serde(default)]
    pub total_seasons: Option<i64>,
    #[serde(default)]
    pub total_episodes: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShowRecord {
    /// Merge a freshly-enriched record into this stored one.
    pub fn apply_update(&mut self, incoming: ShowRecord) {
        let ShowRecord {
            sid: _,
            title,
            original_title,
            release_date,
            overview,
            poster_path,
            backdrop_path,
            popularity,
            vote_average,
            vote_count,
            genres,
            cast,
            creators,
            studios,
            links,
            logo,
            trailer,
            season,
            total_seasons,
            total_episodes,
            status,
            extra,
        } = incoming;

        self.title = title;
        self.original_title = original_title;
        self.release_date = release_date;
        self.overview = overview;
        self.poster_path = poster_path;
        self.backdrop_path = backdrop_path;
        self.popularity = popularity;
        self.vote_average = vote_average;
        self.vote_count = vote_count;
        self.genres = genres;
        self.cast = cast;
        self.creators = creators;
        self.studios = studios;
        self.links = links;
        self.logo = logo;
        self.trailer = trailer;
        self.total_seasons = total_seasons;
        self.total_episodes = total_episodes;
        self.status = status;

        for new_season in season {
            match self
                .season
                .iter_mut()
                .find(|s| s.season_number == new_season.season_number)
            {
                Some(existing_season) => merge_season(existing_season, new_season),
                None => self.season.push(new_season),
            }
        }

        for (key, value) in extra {
            self.extra.insert(key, value);
        }
    }

    #[must_use]
    pub fn find_episode(&self, season_number: i64, episode_number: i64) -> Option<&Episode> {
        self.season
            .iter()
            .find(|s| s.season_number == season_number)?
            .episodes
            .iter()
            .find(|e| e.episode_number == episode_number)
    }

    #[must_use]
    pub fn card(&self) -> MediaCard {
        MediaCard {
            id: self.sid,
            title: self.title.clone(),
            year: year_of(self.release_date.as_deref()),
            poster: self.poster_path.clone(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            media_type: MediaType::Show,
        }
    }

    #[must_use]
    pub fn hero_item(&self) -> HeroItem {
        HeroItem {
            id: self.sid,
            title: self.title.clone(),
            media_type: MediaType::Show,
            backdrop_path: self.backdrop_path.clone(),
            overview: self.overview.clone().unwrap_or_default(),
            release_date: self.release_date.clone().unwrap_or_default(),
            vote_average: self.vote_average.unwrap_or(0.0),
            genres: self.genres.clone(),
            logo: self.logo.clone().unwrap_or_default(),
        }
    }
}

fn merge_season(existing: &mut Season, incoming: Season) {
    for new_episode in incoming.episodes {
        match existing
            .episodes
            .iter_mut()
            .find(|e| e.episode_number == new_episode.episode_number)
        {
            Some(existing_episode) => merge_episode_qualities(existing_episode, new_episode),
            None => existing.episodes.push(new_episode),
        }
    }
}

fn merge_episode_qualities(existing: &mut Episode, incoming: Episode) {
    for new_quality in incoming.quality {
        match existing
            .quality
            .iter_mut()
            .find(|q| q.kind == new_quality.kind)
        {
            Some(slot) => *slot = new_quality,
            None => existing.quality.push(new_quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::movie::variant;

    fn episode(number: i64, kinds: &[&str]) -> Episode {
        Episode {
            episode_number: number,
            name: format!("Episode {number}"),
            overview: None,
            still_path: None,
            air_date: Some("2020-01-01".to_string()),
            quality: kinds
                .iter()
                .map(|k| {
                    let mut v = variant(k);
                    v.runtime = Some(45);
                    v
                })
                .collect(),
        }
    }

    fn show(sid: i64, season_number: i64, ep: Episode) -> ShowRecord {
        ShowRecord {
            sid,
            title: "The Expanse".to_string(),
            original_title: "The Expanse".to_string(),
            release_date: Some("2015-12-14".to_string()),
            overview: None,
            poster_path: None,
            backdrop_path: None,
            popularity: None,
            vote_average: Some(8.4),
            vote_count: Some(4000),
            genres: vec!["Drama".to_string()],
            cast: vec![],
            creators: vec![],
            studios: vec![],
            links: vec![],
            logo: None,
            trailer: None,
            season: vec![Season {
                season_number,
                episodes: vec![ep],
            }],
            total_seasons: Some(6),
            total_episodes: Some(62),
            status: Some("Ended".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn upsert_is_idempotent_for_same_quality_type() {
        let mut stored = show(7, 2, episode(3, &["1080p"]));
        let snapshot = {
            let mut copy = stored.clone();
            copy.apply_update(show(7, 2, episode(3, &["1080p"])));
            copy
        };
        stored.apply_update(show(7, 2, episode(3, &["1080p"])));
        assert_eq!(stored, snapshot);
        assert_eq!(stored.find_episode(2, 3).unwrap().quality.len(), 1);
    }

    #[test]
    fn new_quality_type_is_added() {
        let mut stored = show(7, 2, episode(3, &["1080p"]));
        stored.apply_update(show(7, 2, episode(3, &["720p"])));
        let qualities = &stored.find_episode(2, 3).unwrap().quality;
        assert_eq!(qualities.len(), 2);
    }

    #[test]
    fn colliding_quality_type_is_replaced() {
        let mut stored = show(7, 2, episode(3, &["1080p"]));
        let mut incoming = show(7, 2, episode(3, &["1080p"]));
        incoming.season[0].episodes[0].quality[0].msg_id = 999;
        stored.apply_update(incoming);
        let qualities = &stored.find_episode(2, 3).unwrap().quality;
        assert_eq!(qualities.len(), 1);
        assert_eq!(qualities[0].msg_id, 999);
    }

    #[test]
    fn unknown_season_and_episode_are_appended() {
        let mut stored = show(7, 1, episode(1, &["1080p"]));
        stored.apply_update(show(7, 1, episode(2, &["1080p"])));
        stored.apply_update(show(7, 4, episode(1, &["720p"])));
        assert_eq!(stored.season.len(), 2);
        assert_eq!(stored.season[0].episodes.len(), 2);
        assert!(stored.find_episode(4, 1).is_some());
    }
}
