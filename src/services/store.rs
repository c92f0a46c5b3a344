use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::extraction::ExtractionRecord;

/// In-memory extraction results keyed by record id. Contents do not survive
/// a restart.
#[derive(Default)]
pub struct ResultStore {
    records: RwLock<HashMap<Uuid, ExtractionRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: ExtractionRecord) {
        self.records.write().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<ExtractionRecord> {
        self.records.read().get(&id).cloned()
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<ExtractionRecord> {
        let mut records: Vec<ExtractionRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Returns whether a record was removed.
    pub fn delete(&self, id: Uuid) -> bool {
        self.records.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::extraction::RecordStatus;
    use chrono::{Duration, Utc};

    fn record(minutes_ago: i64) -> ExtractionRecord {
        ExtractionRecord {
            id: Uuid::new_v4(),
            filename: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size: 5,
            status: RecordStatus::Completed,
            text: Some("hello".to_string()),
            error: None,
            word_count: 1,
            character_count: 5,
            attempts: 1,
            processing_time_ms: Some(3),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_insert_get_delete() {
        let store = ResultStore::new();
        let rec = record(0);
        let id = rec.id;
        store.insert(rec);

        assert_eq!(store.get(id).unwrap().filename, "a.txt");
        assert!(store.delete(id));
        assert!(!store.delete(id));
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_newest_first() {
        let store = ResultStore::new();
        let old = record(10);
        let new = record(1);
        let (old_id, new_id) = (old.id, new.id);
        store.insert(old);
        store.insert(new);

        let ids: Vec<Uuid> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new_id, old_id]);
        assert_eq!(store.len(), 2);
    }
}
