//! Learning records: per-account activity log

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JsonFileStore, normalize_email};
use crate::{Error, Result};

/// One recorded activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRecord {
    /// What was done (e.g. "listening-test")
    pub activity: String,
    /// Free-form detail
    #[serde(default)]
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl LearningRecord {
    #[must_use]
    pub fn now(activity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Activity records keyed by e-mail, one JSON file
pub struct LearningRecordStore {
    inner: JsonFileStore<Vec<LearningRecord>>,
}

impl LearningRecordStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: JsonFileStore::new(path),
        }
    }

    /// Append a record; returns the new record count for the account
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for a bad e-mail or blank activity
    pub fn append(&self, email: &str, record: LearningRecord) -> Result<usize> {
        let email = normalize_email(email)?;
        if record.activity.trim().is_empty() {
            return Err(Error::invalid("activity must not be empty"));
        }

        let count = self.inner.update(|all| {
            let records = all.entry(email.clone()).or_default();
            records.push(record);
            Ok(records.len())
        })?;

        tracing::debug!(email = %email, count, "learning record appended");
        Ok(count)
    }

    /// Records for one account, oldest first
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for a bad e-mail
    pub fn list(&self, email: &str) -> Result<Vec<LearningRecord>> {
        let email = normalize_email(email)?;
        Ok(self.inner.get(&email)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_order_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningRecordStore::new(dir.path().join("records.json"));

        for n in 1..=3 {
            let count = store
                .append("kim@school.kr", LearningRecord::now("quiz", format!("round {n}")))
                .unwrap();
            assert_eq!(count, n);
        }
        store
            .append("LEE@school.kr", LearningRecord::now("listening-test", ""))
            .unwrap();

        let kim = store.list("kim@school.kr").unwrap();
        let details: Vec<_> = kim.iter().map(|r| r.detail.as_str()).collect();
        assert_eq!(details, ["round 1", "round 2", "round 3"]);
        assert_eq!(store.list("lee@school.kr").unwrap().len(), 1);
        assert!(store.list("park@school.kr").unwrap().is_empty());
    }

    #[test]
    fn rejects_blank_activity() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningRecordStore::new(dir.path().join("records.json"));
        let result = store.append("kim@school.kr", LearningRecord::now("  ", "x"));
        assert!(matches!(result, Err(Error::InputValidation(_))));
    }
}
