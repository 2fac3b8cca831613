//! Catalog store adapter: movie/show/user/config collections persisted
//! as JSONB documents with unique secondary keys. Nested merge
//! semantics live on the record types; repositories do the
//! read-merge-write cycle and the paginated/aggregation queries.

pub mod configs;
pub mod movies;
pub mod shows;
pub mod users;

pub use configs::ConfigRepository;
pub use movies::MovieRepository;
pub use shows::ShowRepository;
pub use users::{RegisterStatus, UserRepository};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Accepted list sort orders; unknown values fall back to `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first (internal id descending).
    New,
    /// Highest rated first.
    Most,
    /// Most recent release date first.
    Date,
}

impl SortOrder {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "most" => Self::Most,
            "date" => Self::Date,
            _ => Self::New,
        }
    }

    pub(crate) fn sql_clause(self) -> &'static str {
        match self {
            Self::New => "ORDER BY id DESC",
            Self::Most => {
                "ORDER BY (doc->>'vote_average')::double precision DESC NULLS LAST, id DESC"
            }
            Self::Date => "ORDER BY doc->>'release_date' DESC NULLS LAST, id DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub status: UpsertStatus,
    /// The record's public id (mid/sid).
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Success,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub status: DeleteStatus,
    pub deleted_count: u64,
}

pub(crate) fn decode_doc<T: DeserializeOwned>(doc: serde_json::Value) -> Result<T> {
    serde_json::from_value(doc).map_err(Error::Serialization)
}
