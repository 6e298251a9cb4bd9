use serde::{Deserialize, Serialize};

/// Request to copy one collection, or every collection, between databases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    pub source_location: String,
    pub source_database: String,
    pub target_location: String,
    pub target_database: String,
    /// Single collection to copy. Absent or empty copies all collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl CopyRequest {
    pub fn new(
        source_location: &str,
        source_database: &str,
        target_location: &str,
        target_database: &str,
    ) -> Self {
        Self {
            source_location: source_location.to_string(),
            source_database: source_database.to_string(),
            target_location: target_location.to_string(),
            target_database: target_database.to_string(),
            collection: None,
        }
    }

    /// Restricts the copy to a single collection.
    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// The collection to copy, treating an empty name as absent.
    pub fn single_collection(&self) -> Option<&str> {
        self.collection.as_deref().filter(|c| !c.is_empty())
    }
}

/// Response to a start request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: String,
}
