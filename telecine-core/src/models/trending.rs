use serde::{Deserialize, Serialize};

use super::MediaCard;

/// Admin-curated ids highlighted on the front page. Stored as the single
/// config document keyed `trending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingConfig {
    #[serde(default)]
    pub movie: Vec<i64>,
    #[serde(default)]
    pub show: Vec<i64>,
}

/// Trending ids resolved to card records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingEntries {
    #[serde(default)]
    pub movie: Vec<MediaCard>,
    #[serde(default)]
    pub show: Vec<MediaCard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_default_to_empty() {
        let config: TrendingConfig = serde_json::from_str("{}").unwrap();
        assert!(config.movie.is_empty());
        assert!(config.show.is_empty());
    }
}
