pub mod card;
pub mod movie;
pub mod pagination;
pub mod show;
pub mod trending;
pub mod user;

pub use card::{year_of, HeroItem, MediaCard, ScoredCard};
pub use movie::{CastMember, MovieRecord, QualityVariant};
pub use pagination::{Page, PageMeta, PageParams};
pub use show::{Episode, Season, ShowRecord};
pub use trending::{TrendingConfig, TrendingEntries};
pub use user::UserRecord;

use serde::{Deserialize, Serialize};

/// Kind of catalog entry a record or token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Show,
}

impl MediaType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "show" => Some(Self::Show),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parse_round_trip() {
        assert_eq!(MediaType::parse("movie"), Some(MediaType::Movie));
        assert_eq!(MediaType::parse("show"), Some(MediaType::Show));
        assert_eq!(MediaType::parse("series"), None);
        assert_eq!(MediaType::Movie.as_str(), "movie");
    }
}
