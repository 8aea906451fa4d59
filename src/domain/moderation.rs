use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub post_id: String,
    pub reporter_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub post_id: String,
    pub reporter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub reported_at: OffsetDateTime,
}
