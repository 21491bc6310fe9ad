//! Mood tracking storage using redb.
//!
//! This module persists:
//! - Session ratings (1 to 5)
//! - Points awarded for chatting and journaling
//! - Emotion logs produced by [`LexiconAnalyzer`]
//!
//! Rows are JSON values keyed by ULID, so they iterate in creation order
//! (to the millisecond).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use crate::error::{CompanionError, CompanionResult};

mod lexicon;
mod records;

pub use lexicon::{LexiconAnalyzer, UNDETERMINED};
pub use records::{EmotionAnalysis, EmotionLog, PointsEntry, SessionRating};

/// File name of the analytics database inside the data directory
pub const ANALYTICS_FILE: &str = "analytics.redb";

type RowTable = TableDefinition<'static, &'static str, &'static [u8]>;

const SESSION_RATINGS_TABLE: RowTable = TableDefinition::new("session_ratings");
const POINTS_TABLE: RowTable = TableDefinition::new("points");
const EMOTION_LOGS_TABLE: RowTable = TableDefinition::new("emotion_logs");

/// Mood and engagement statistics
#[derive(Clone)]
pub struct AnalyticsStore {
    db: Arc<RwLock<Database>>,
}

impl AnalyticsStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> CompanionResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSION_RATINGS_TABLE)?;
            let _ = write_txn.open_table(POINTS_TABLE)?;
            let _ = write_txn.open_table(EMOTION_LOGS_TABLE)?;
        }
        write_txn.commit()?;
        info!(path = %path.display(), "Analytics database initialized");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session Ratings
    // ═══════════════════════════════════════════════════════════════════════

    pub fn save_session_rating(&self, user_id: &str, score: u8) -> CompanionResult<SessionRating> {
        if !(1..=5).contains(&score) {
            return Err(CompanionError::InvalidInput(format!(
                "rating must be between 1 and 5, got {}",
                score
            )));
        }
        let rating = SessionRating {
            user_id: user_id.to_string(),
            date: Utc::now(),
            score,
        };
        self.insert(SESSION_RATINGS_TABLE, &rating)?;
        info!(user_id, score, "Saved session rating");
        Ok(rating)
    }

    /// Ratings of the last seven days before `now`.
    pub fn weekly_ratings(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CompanionResult<Vec<SessionRating>> {
        let since = now - Duration::days(7);
        Ok(self
            .scan::<SessionRating>(SESSION_RATINGS_TABLE)?
            .into_iter()
            .filter(|r| r.user_id == user_id && r.date >= since)
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Points
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_points(&self, user_id: &str, amount: i64, source: &str) -> CompanionResult<()> {
        let entry = PointsEntry {
            user_id: user_id.to_string(),
            date: Utc::now(),
            amount,
            source: source.to_string(),
        };
        self.insert(POINTS_TABLE, &entry)?;
        info!(user_id, amount, source, "Added points");
        Ok(())
    }

    pub fn total_points(&self, user_id: &str) -> CompanionResult<i64> {
        Ok(self
            .scan::<PointsEntry>(POINTS_TABLE)?
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.amount)
            .sum())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Emotions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn save_emotion(&self, user_id: &str, analysis: &EmotionAnalysis) -> CompanionResult<()> {
        let log = EmotionLog {
            user_id: user_id.to_string(),
            date: Utc::now(),
            analysis: analysis.clone(),
        };
        self.insert(EMOTION_LOGS_TABLE, &log)?;
        info!(user_id, emotion = %analysis.emotion, "Saved emotion");
        Ok(())
    }

    pub fn emotion_logs(&self, user_id: &str) -> CompanionResult<Vec<EmotionLog>> {
        Ok(self
            .scan::<EmotionLog>(EMOTION_LOGS_TABLE)?
            .into_iter()
            .filter(|l| l.user_id == user_id)
            .collect())
    }

    /// How often each emotion was logged for the user.
    pub fn mood_stats(&self, user_id: &str) -> CompanionResult<BTreeMap<String, usize>> {
        let mut stats = BTreeMap::new();
        for log in self.emotion_logs(user_id)? {
            *stats.entry(log.analysis.emotion).or_insert(0) += 1;
        }
        Ok(stats)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Housekeeping
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete every row of every table.
    pub fn clear(&self) -> CompanionResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        for table in [SESSION_RATINGS_TABLE, POINTS_TABLE, EMOTION_LOGS_TABLE] {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;
        info!("Cleared analytics database");
        Ok(())
    }

    fn insert<T: Serialize>(&self, table_def: RowTable, row: &T) -> CompanionResult<()> {
        let data = serde_json::to_vec(row).map_err(|e| CompanionError::Serialization(e.to_string()))?;
        let key = Ulid::new().to_string();

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, table_def: RowTable) -> CompanionResult<Vec<T>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(table_def)?;

        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let row = serde_json::from_slice(value.value())
                .map_err(|e| CompanionError::corrupt(key.value(), e))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (AnalyticsStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = AnalyticsStore::open(temp_dir.path().join(ANALYTICS_FILE)).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir").join(ANALYTICS_FILE);
        assert!(AnalyticsStore::open(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_session_ratings() {
        let (store, _temp) = create_test_store();
        store.save_session_rating("U1", 4).unwrap();
        store.save_session_rating("U2", 2).unwrap();
        assert!(store.save_session_rating("U1", 0).is_err());
        assert!(store.save_session_rating("U1", 6).is_err());

        let week = store.weekly_ratings("U1", Utc::now()).unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].score, 4);

        let later = store
            .weekly_ratings("U1", Utc::now() + Duration::days(8))
            .unwrap();
        assert!(later.is_empty());
    }

    #[test]
    fn test_points() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.total_points("U1").unwrap(), 0);

        store.add_points("U1", 5, "message").unwrap();
        store.add_points("U1", 10, "diary").unwrap();
        store.add_points("U2", 7, "message").unwrap();

        assert_eq!(store.total_points("U1").unwrap(), 15);
    }

    #[test]
    fn test_mood_stats() {
        let (store, _temp) = create_test_store();
        let analyzer = LexiconAnalyzer::new();
        for text in ["so happy", "glad today", "sad again"] {
            store.save_emotion("U1", &analyzer.analyze(text)).unwrap();
        }

        let stats = store.mood_stats("U1").unwrap();
        assert_eq!(stats.get("joy"), Some(&2));
        assert_eq!(stats.get("sadness"), Some(&1));
        assert!(store.mood_stats("U2").unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ANALYTICS_FILE);
        {
            let store = AnalyticsStore::open(&path).unwrap();
            store.add_points("U1", 5, "message").unwrap();
        }
        let store = AnalyticsStore::open(&path).unwrap();
        assert_eq!(store.total_points("U1").unwrap(), 5);
    }

    #[test]
    fn test_clear() {
        let (store, _temp) = create_test_store();
        store.add_points("U1", 5, "message").unwrap();
        store.save_session_rating("U1", 3).unwrap();

        store.clear().unwrap();
        assert_eq!(store.total_points("U1").unwrap(), 0);
        assert!(store.weekly_ratings("U1", Utc::now()).unwrap().is_empty());
    }
}
