use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::models::ClassificationResult;

/// Classifications accumulated across CLI invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub classifications: Vec<ClassificationResult>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            classifications: Vec::new(),
        }
    }

    /// Save session to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved session to {:?}", path);
        Ok(())
    }

    /// Load session from disk
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No session file at {:?}, starting fresh", path);
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let session: Self = serde_json::from_str(&json)?;

        tracing::debug!(
            "Loaded session {}: {} classifications",
            session.session_id,
            session.classifications.len()
        );

        Ok(session)
    }

    /// Append results, stamping each with the time it was recorded
    pub fn extend(&mut self, results: impl IntoIterator<Item = ClassificationResult>) -> usize {
        let now = Utc::now();
        let before = self.classifications.len();

        self.classifications.extend(results.into_iter().map(|mut result| {
            result.classified_at.get_or_insert(now);
            result
        }));

        self.updated_at = now;
        self.classifications.len() - before
    }

    /// The last `limit` classifications, newest first
    pub fn recent(&self, limit: usize) -> Vec<&ClassificationResult> {
        self.classifications.iter().rev().take(limit).collect()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.classifications.len();
        self.classifications.clear();
        self.updated_at = Utc::now();
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classifications.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use tempfile::tempdir;

    fn result(subject: &str) -> ClassificationResult {
        ClassificationResult {
            subject: subject.to_string(),
            from: Some("a@example.com".to_string()),
            category: "Inquiry".to_string(),
            priority: Priority::Medium,
            confidence: 0.8,
            sentiment: None,
            reply: None,
            classified_at: None,
        }
    }

    #[test]
    fn test_new_session() {
        let session = Session::new();
        assert!(session.is_empty());
        assert_eq!(session.created_at, session.updated_at);
        assert!(uuid::Uuid::parse_str(&session.session_id).is_ok());
    }

    #[test]
    fn test_extend_stamps_classified_at() {
        let mut session = Session::new();
        let added = session.extend(vec![result("a"), result("b")]);

        assert_eq!(added, 2);
        assert!(session.classifications.iter().all(|c| c.classified_at.is_some()));
    }

    #[test]
    fn test_extend_keeps_existing_timestamp() {
        let mut session = Session::new();
        let stamped = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut pre = result("old");
        pre.classified_at = Some(stamped);

        session.extend(vec![pre]);
        assert_eq!(session.classifications[0].classified_at, Some(stamped));
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut session = Session::new();
        session.extend(["one", "two", "three"].map(result));

        let recent: Vec<&str> = session.recent(2).iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(recent, vec!["three", "two"]);
        assert_eq!(session.recent(10).len(), 3);
        assert!(session.recent(0).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut session = Session::new();
        session.extend(vec![result("a")]);

        assert_eq!(session.clear(), 1);
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut session = Session::new();
        session.extend(vec![result("persisted")]);
        session.save(&path).await.unwrap();

        let loaded = Session::load(&path).await.unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.classifications[0].subject, "persisted");
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let session = Session::load(&dir.path().join("missing.json")).await.unwrap();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(Session::load(&path).await.is_err());
    }
}
