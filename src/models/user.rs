use chrono::{DateTime, Utc};
use serde::Serialize;

/// A known account. Reports are only served for these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub uid: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}
