use serde::{Deserialize, Serialize};

/// Canonical poll record. Options are stored as a JSON array in the
/// database and materialized here as a vector of option labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub poll_type: PollType,
    pub hide_results: bool,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollType {
    Single,
    Multiple,
}

impl PollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollType::Single => "single",
            PollType::Multiple => "multiple",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "multiple" => PollType::Multiple,
            _ => PollType::Single,
        }
    }
}

/// Raw database row for a poll. Options and poll type are stored as
/// TEXT and decoded into their typed forms by [`PollRow::into_poll`].
#[derive(Debug, sqlx::FromRow)]
pub struct PollRow {
    pub id: String,
    pub question: String,
    pub options: String,
    pub poll_type: String,
    pub hide_results: bool,
    pub is_active: bool,
    pub created_at: i64,
}

impl PollRow {
    pub fn into_poll(self) -> Poll {
        let options = serde_json::from_str(&self.options).unwrap_or_default();
        Poll {
            id: self.id,
            question: self.question,
            options,
            poll_type: PollType::from_db(&self.poll_type),
            hide_results: self.hide_results,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default = "default_poll_type")]
    pub poll_type: PollType,
    #[serde(default)]
    pub hide_results: bool,
}

fn default_poll_type() -> PollType {
    PollType::Single
}
