use super::actor::ActorId;
use crate::errors::{AppError, AppResult};
use crate::utils::time::{format_instant, parse_instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type IdeaId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Heart,
    Like,
    Funny,
}

impl Reaction {
    pub const ALL: [Reaction; 3] = [Reaction::Heart, Reaction::Like, Reaction::Funny];

    pub fn key(&self) -> &'static str {
        match self {
            Reaction::Heart => "heart",
            Reaction::Like => "like",
            Reaction::Funny => "funny",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Reaction::Heart => "❤️",
            Reaction::Like => "👍",
            Reaction::Funny => "😂",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Reaction {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "heart" => Ok(Reaction::Heart),
            "like" => Ok(Reaction::Like),
            "funny" => Ok(Reaction::Funny),
            other => Err(AppError::InvalidReaction(other.to_string())),
        }
    }
}

pub type Reactions = BTreeMap<Reaction, Vec<ActorId>>;

/// A piece of feedback with lightweight voting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Idea {
    pub id: IdeaId,
    pub text: String,
    pub submitted_by: ActorId,
    pub reacts: Reactions,
    pub num_reacts: usize,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    pub fn to_record(&self) -> IdeaRecord {
        IdeaRecord {
            id: self.id,
            idea: self.text.clone(),
            submitted_by: self.submitted_by.as_str().to_string(),
            reacts: self.reacts.clone(),
            num_reacts: self.num_reacts as i64,
            created_at: format_instant(&self.created_at),
        }
    }
}

/// Row shape of the `ideas` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub id: i64,
    pub idea: String,
    pub submitted_by: String,
    #[serde(default)]
    pub reacts: Reactions,
    #[serde(default)]
    pub num_reacts: i64,
    pub created_at: String,
}

impl TryFrom<IdeaRecord> for Idea {
    type Error = AppError;

    fn try_from(rec: IdeaRecord) -> AppResult<Self> {
        let created_at = parse_instant(&rec.created_at)
            .map_err(|e| AppError::InvalidRecord(format!("idea {}: {e}", rec.id)))?;
        // The stored counter is a cache; the reactor lists are the truth.
        let num_reacts = rec.reacts.values().map(Vec::len).sum();
        Ok(Idea {
            id: rec.id,
            text: rec.idea,
            submitted_by: ActorId::new(rec.submitted_by),
            reacts: rec.reacts,
            num_reacts,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_keys_parse_case_insensitively() {
        assert_eq!("Heart".parse::<Reaction>().unwrap(), Reaction::Heart);
        assert!(matches!(
            "angry".parse::<Reaction>(),
            Err(AppError::InvalidReaction(_))
        ));
    }

    #[test]
    fn record_counter_is_recomputed() {
        let rec: IdeaRecord = serde_json::from_str(
            r#"{"id": 1, "idea": "dark mode", "submitted_by": "alice",
                "reacts": {"heart": ["bob", "carol"], "funny": ["bob"]},
                "num_reacts": 12, "created_at": "2025-02-01T10:00:00Z"}"#,
        )
        .unwrap();
        let idea = Idea::try_from(rec).unwrap();
        assert_eq!(idea.num_reacts, 3);
        assert_eq!(idea.reacts[&Reaction::Heart].len(), 2);
    }
}
