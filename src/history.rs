use crate::chart::ChartKind;
use crate::saving::{HISTORY_KEY, LocalStorage, load_json, save_json};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// ISO-8601 UTC timestamp with millisecond precision, e.g.
/// `2024-03-01T09:30:00.000Z`.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hands out millisecond timestamps for use as ids. Two calls within the same
/// millisecond still get distinct, increasing values.
#[derive(Debug, Default)]
pub struct IdClock {
    last: i64,
}

impl IdClock {
    pub fn next(&mut self) -> i64 {
        let id = Utc::now().timestamp_millis().max(self.last + 1);
        self.last = id;
        id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: i64,
    pub timestamp: String,
    pub x_axis: String,
    pub y_axis: String,
    pub chart_type: ChartKind,
    /// Row count of the dataset when the analysis was saved.
    pub data_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHistoryEntry {
    pub id: i64,
    pub file_name: String,
    pub upload_date: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyses: Option<Vec<AnalysisRecord>>,
}

impl UploadHistoryEntry {
    pub fn analyses(&self) -> &[AnalysisRecord] {
        self.analyses.as_deref().unwrap_or_default()
    }
}

/// Past uploads, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadHistoryStore {
    entries: Vec<UploadHistoryEntry>,
}

impl UploadHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(storage: &dyn LocalStorage) -> Self {
        Self {
            entries: load_json(storage, HISTORY_KEY).unwrap_or_default(),
        }
    }

    pub fn persist(&self, storage: &dyn LocalStorage) {
        save_json(storage, HISTORY_KEY, &self.entries);
    }

    pub fn entries(&self) -> &[UploadHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&UploadHistoryEntry> {
        self.entries.first()
    }

    pub fn get(&self, id: i64) -> Option<&UploadHistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn recent(&self, n: usize) -> &[UploadHistoryEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn prepend(&mut self, entry: UploadHistoryEntry) {
        self.entries.insert(0, entry);
    }

    /// Records the server identifier of a synced upload. Returns `false` when
    /// the entry has been deleted in the meantime.
    pub fn attach_server_id(&mut self, id: i64, server_id: String) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.server_id = Some(server_id);
                true
            }
            None => false,
        }
    }

    /// Appends an analysis to the newest entry and returns that entry.
    pub fn append_analysis(&mut self, record: AnalysisRecord) -> Option<&UploadHistoryEntry> {
        let entry = self.entries.first_mut()?;
        entry.analyses.get_or_insert_with(Vec::new).push(record);
        Some(entry)
    }

    pub fn delete(&mut self, id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saving::MemoryStorage;

    fn entry(id: i64, name: &str) -> UploadHistoryEntry {
        UploadHistoryEntry {
            id,
            file_name: name.to_string(),
            upload_date: "2024-01-01T00:00:00.000Z".to_string(),
            row_count: 3,
            columns: vec!["A".into(), "B".into()],
            server_id: None,
            analyses: None,
        }
    }

    fn analysis(id: i64) -> AnalysisRecord {
        AnalysisRecord {
            id,
            timestamp: iso_now(),
            x_axis: "A".into(),
            y_axis: "B".into(),
            chart_type: ChartKind::Bar,
            data_points: 3,
        }
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut store = UploadHistoryStore::new();
        store.prepend(entry(1, "old.xlsx"));
        store.prepend(entry(2, "new.xlsx"));
        assert_eq!(store.latest().unwrap().file_name, "new.xlsx");
        assert_eq!(store.recent(5).len(), 2);
    }

    #[test]
    fn delete_removes_only_the_matching_entry() {
        let mut store = UploadHistoryStore::new();
        for id in 1..=4 {
            store.prepend(entry(id, &format!("f{}.xlsx", id)));
        }

        assert!(store.delete(2));
        assert!(!store.delete(2));
        let ids: Vec<i64> = store.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3, 1]);
    }

    #[test]
    fn server_id_targets_entry_by_id() {
        let mut store = UploadHistoryStore::new();
        store.prepend(entry(10, "first.xlsx"));
        store.prepend(entry(11, "second.xlsx"));

        assert!(store.attach_server_id(10, "abc".into()));
        assert_eq!(store.get(10).unwrap().server_id.as_deref(), Some("abc"));
        assert_eq!(store.get(11).unwrap().server_id, None);
        assert!(!store.attach_server_id(99, "zzz".into()));
    }

    #[test]
    fn analyses_attach_to_newest_entry() {
        let mut store = UploadHistoryStore::new();
        assert!(store.append_analysis(analysis(1)).is_none());

        store.prepend(entry(1, "a.xlsx"));
        store.prepend(entry(2, "b.xlsx"));
        store.append_analysis(analysis(5));
        store.append_analysis(analysis(6));

        assert_eq!(store.get(2).unwrap().analyses().len(), 2);
        assert!(store.get(1).unwrap().analyses().is_empty());
    }

    #[test]
    fn persisted_json_uses_camel_case_and_round_trips() {
        let storage = MemoryStorage::new();
        let mut store = UploadHistoryStore::new();
        store.prepend(entry(7, "x.xlsx"));
        store.append_analysis(analysis(8));
        store.persist(&storage);

        let raw = storage.get_item(HISTORY_KEY).unwrap();
        assert!(raw.contains("\"fileName\":\"x.xlsx\""));
        assert!(raw.contains("\"chartType\":\"bar\""));
        assert!(!raw.contains("serverId"));

        assert_eq!(UploadHistoryStore::load(&storage), store);
    }

    #[test]
    fn id_clock_never_repeats() {
        let mut clock = IdClock::default();
        let ids: Vec<i64> = (0..50).map(|_| clock.next()).collect();
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }
}
