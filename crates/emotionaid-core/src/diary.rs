//! Diary entries, tags and triggers persisted in the KV store.
//!
//! Entries are stored in pages of [`ENTRIES_PER_PAGE`] under
//! `diary_entries_<userId>_page<N>`, starting at page 1. New entries go to the
//! last page; a full page opens the next one.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{CompanionError, CompanionResult};
use crate::store::{keyspace, KvStore};
use crate::types::DiaryEntry;

/// Capacity of one stored diary page
pub const ENTRIES_PER_PAGE: usize = 50;

/// Reads and writes a user's diary.
#[derive(Clone)]
pub struct DiaryRepository {
    store: KvStore,
    /// Held across read-modify-write sequences
    writes: Arc<Mutex<()>>,
}

impl DiaryRepository {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    async fn load_page(&self, user_id: &str, page: u32) -> CompanionResult<Option<Vec<DiaryEntry>>> {
        self.store.load(&keyspace::diary_page(user_id, page)).await
    }

    /// Number of stored pages (0 when the diary is empty).
    async fn page_count(&self, user_id: &str) -> CompanionResult<u32> {
        let mut count = 0;
        while self
            .store
            .contains(&keyspace::diary_page(user_id, count + 1))
            .await?
        {
            count += 1;
        }
        Ok(count)
    }

    /// One page of entries, oldest first.
    ///
    /// `page` starts at 1. Pages are counted in units of `page_size`
    /// regardless of how entries are split on disk.
    pub async fn entries(
        &self,
        user_id: &str,
        page: u32,
        page_size: usize,
    ) -> CompanionResult<Vec<DiaryEntry>> {
        if page == 0 || page_size == 0 {
            return Err(CompanionError::InvalidInput(
                "page and page size start at 1".into(),
            ));
        }

        let start = u64::from(page - 1).saturating_mul(page_size as u64);
        let per_page = ENTRIES_PER_PAGE as u64;
        // A start past the last addressable page is past the end of any diary
        let Ok(mut stored_page) = u32::try_from(start / per_page + 1) else {
            return Ok(Vec::new());
        };
        let mut skip = (start % per_page) as usize;
        let mut result = Vec::with_capacity(page_size.min(ENTRIES_PER_PAGE));

        while result.len() < page_size {
            let Some(entries) = self.load_page(user_id, stored_page).await? else {
                break;
            };
            let wanted = page_size - result.len();
            result.extend(entries.into_iter().skip(skip).take(wanted));
            skip = 0;
            let Some(next) = stored_page.checked_add(1) else {
                break;
            };
            stored_page = next;
        }
        Ok(result)
    }

    /// Every current (non-archived) entry, oldest first.
    pub async fn all_entries(&self, user_id: &str) -> CompanionResult<Vec<DiaryEntry>> {
        let mut all = Vec::new();
        let mut page = 1;
        while let Some(entries) = self.load_page(user_id, page).await? {
            all.extend(entries);
            page += 1;
        }
        Ok(all)
    }

    /// Store a new entry and record its tags.
    pub async fn create_entry(&self, user_id: &str, entry: &DiaryEntry) -> CompanionResult<()> {
        entry.validate()?;

        let _guard = self.writes.lock().await;
        let last = self.page_count(user_id).await?.max(1);
        let mut page = last;
        let mut entries = self.load_page(user_id, last).await?.unwrap_or_default();
        if entries.len() >= ENTRIES_PER_PAGE {
            page = last + 1;
            entries = Vec::new();
        }
        entries.push(entry.clone());
        self.store
            .save(&keyspace::diary_page(user_id, page), &entries)
            .await?;

        for tag in &entry.tags {
            self.insert_unique(&keyspace::diary_tags(user_id), tag).await?;
        }

        info!(user_id, page, title = %entry.title, "Created diary entry");
        Ok(())
    }

    /// Known tags, in the order they were first used.
    pub async fn tags(&self, user_id: &str) -> CompanionResult<Vec<String>> {
        Ok(self
            .store
            .load(&keyspace::diary_tags(user_id))
            .await?
            .unwrap_or_default())
    }

    /// Record a tag. Returns `false` if it was already known.
    pub async fn add_tag(&self, user_id: &str, tag: &str) -> CompanionResult<bool> {
        let _guard = self.writes.lock().await;
        self.insert_unique(&keyspace::diary_tags(user_id), tag).await
    }

    /// Mood triggers noted by the user.
    pub async fn triggers(&self, user_id: &str) -> CompanionResult<Vec<String>> {
        Ok(self
            .store
            .load(&keyspace::triggers(user_id))
            .await?
            .unwrap_or_default())
    }

    /// Record a trigger. Returns `false` if it was already known.
    pub async fn add_trigger(&self, user_id: &str, trigger: &str) -> CompanionResult<bool> {
        let _guard = self.writes.lock().await;
        self.insert_unique(&keyspace::triggers(user_id), trigger).await
    }

    /// Move every current entry into the user's archive.
    ///
    /// Returns the number of entries archived.
    pub async fn archive_entries(&self, user_id: &str) -> CompanionResult<usize> {
        let _guard = self.writes.lock().await;
        let entries = self.all_entries(user_id).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let archive_key = keyspace::diary_archive(user_id);
        let mut archive: Vec<DiaryEntry> = self.store.load(&archive_key).await?.unwrap_or_default();
        archive.extend(entries.iter().cloned());
        self.store.save(&archive_key, &archive).await?;

        let pages = self.page_count(user_id).await?;
        for page in 1..=pages {
            self.store.remove(&keyspace::diary_page(user_id, page)).await?;
        }

        info!(user_id, count = entries.len(), "Archived diary entries");
        Ok(entries.len())
    }

    /// Entries moved out by [`archive_entries`](Self::archive_entries).
    pub async fn archived(&self, user_id: &str) -> CompanionResult<Vec<DiaryEntry>> {
        Ok(self
            .store
            .load(&keyspace::diary_archive(user_id))
            .await?
            .unwrap_or_default())
    }

    /// Write every current entry to `path` as pretty-printed JSON.
    ///
    /// Returns the number of entries exported.
    pub async fn export_entries(&self, user_id: &str, path: &Path) -> CompanionResult<usize> {
        let entries = self.all_entries(user_id).await?;
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|e| CompanionError::Serialization(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        info!(user_id, path = %path.display(), count = entries.len(), "Exported diary entries");
        Ok(entries.len())
    }

    async fn insert_unique(&self, key: &str, value: &str) -> CompanionResult<bool> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CompanionError::InvalidInput("value cannot be empty".into()));
        }
        let mut values: Vec<String> = self.store.load(key).await?.unwrap_or_default();
        if values.iter().any(|v| v == value) {
            return Ok(false);
        }
        values.push(value.to_string());
        self.store.save(key, &values).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyProvider;
    use tempfile::TempDir;

    fn create_test_repo() -> (DiaryRepository, KvStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path(), Arc::new(StaticKeyProvider::random())).unwrap();
        (DiaryRepository::new(store.clone()), store, temp_dir)
    }

    fn entry(n: usize) -> DiaryEntry {
        DiaryEntry::new(format!("Day {}", n), "ok").unwrap()
    }

    #[tokio::test]
    async fn test_reads_preexisting_page() {
        let (diary, store, _temp) = create_test_repo();
        let day1 = DiaryEntry::new("Day 1", "ok").unwrap();
        store
            .save("diary_entries_U1_page1", &vec![day1.clone()])
            .await
            .unwrap();

        let entries = diary.entries("U1", 1, 50).await.unwrap();
        assert_eq!(entries, vec![day1]);
    }

    #[tokio::test]
    async fn test_create_rolls_over_full_page() {
        let (diary, store, _temp) = create_test_repo();

        for n in 0..ENTRIES_PER_PAGE + 3 {
            diary.create_entry("U1", &entry(n)).await.unwrap();
        }

        let page1: Vec<DiaryEntry> = store.load("diary_entries_U1_page1").await.unwrap().unwrap();
        let page2: Vec<DiaryEntry> = store.load("diary_entries_U1_page2").await.unwrap().unwrap();
        assert_eq!(page1.len(), ENTRIES_PER_PAGE);
        assert_eq!(page2.len(), 3);
        assert_eq!(page2[0].title, format!("Day {}", ENTRIES_PER_PAGE));
    }

    #[tokio::test]
    async fn test_logical_pages_span_stored_pages() {
        let (diary, _store, _temp) = create_test_repo();
        for n in 0..60 {
            diary.create_entry("U1", &entry(n)).await.unwrap();
        }

        let page3 = diary.entries("U1", 3, 20).await.unwrap();
        let titles: Vec<_> = page3.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles.len(), 20);
        assert_eq!(titles[0], "Day 40");
        assert_eq!(titles[19], "Day 59");

        assert!(diary.entries("U1", 4, 20).await.unwrap().is_empty());
        assert!(diary.entries("U1", 0, 20).await.is_err());
    }

    #[tokio::test]
    async fn test_huge_page_is_past_the_end() {
        let (diary, _store, _temp) = create_test_repo();
        diary.create_entry("U1", &entry(1)).await.unwrap();

        assert!(diary.entries("U1", 1_431_655_766, 150).await.unwrap().is_empty());
        assert!(diary.entries("U1", u32::MAX, usize::MAX).await.unwrap().is_empty());
        assert_eq!(diary.entries("U1", 1, usize::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entry_tags_are_recorded() {
        let (diary, _store, _temp) = create_test_repo();
        let tagged = entry(1).with_tag("Work").with_tag("Sleep");

        diary.create_entry("U1", &tagged).await.unwrap();
        assert!(!diary.add_tag("U1", "Work").await.unwrap());
        assert!(diary.add_tag("U1", "Quick").await.unwrap());

        assert_eq!(diary.tags("U1").await.unwrap(), vec!["Work", "Sleep", "Quick"]);
    }

    #[tokio::test]
    async fn test_triggers() {
        let (diary, _store, _temp) = create_test_repo();
        assert!(diary.add_trigger("U1", "deadlines").await.unwrap());
        assert!(!diary.add_trigger("U1", "deadlines").await.unwrap());
        assert!(diary.add_trigger("U1", "  ").await.is_err());
        assert_eq!(diary.triggers("U1").await.unwrap(), vec!["deadlines"]);
    }

    #[tokio::test]
    async fn test_archive_moves_entries() {
        let (diary, _store, _temp) = create_test_repo();
        for n in 0..3 {
            diary.create_entry("U1", &entry(n)).await.unwrap();
        }

        assert_eq!(diary.archive_entries("U1").await.unwrap(), 3);
        assert!(diary.all_entries("U1").await.unwrap().is_empty());
        assert_eq!(diary.archived("U1").await.unwrap().len(), 3);
        assert_eq!(diary.archive_entries("U1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_export_entries() {
        let (diary, _store, temp) = create_test_repo();
        diary.create_entry("U1", &entry(1)).await.unwrap();

        let path = temp.path().join("export.json");
        assert_eq!(diary.export_entries("U1", &path).await.unwrap(), 1);

        let exported: Vec<DiaryEntry> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(exported[0].title, "Day 1");
    }
}
