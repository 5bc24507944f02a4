//! In-memory record store for one session.
//!
//! Membership changes only through [`RecordStore::replace_all`]; parse
//! results are merged into existing entries and never appended.

use crate::models::PaperRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<PaperRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[PaperRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Discard the current list and take `records`.
    pub fn replace_all(&mut self, records: Vec<PaperRecord>) {
        self.records = records;
    }

    /// Replace the stored record each incoming record matches (see
    /// [`PaperRecord::is_matched_by`]). Unmatched incoming records are dropped.
    ///
    /// Returns the number of stored records replaced.
    pub fn merge_parse_results(&mut self, updated: &[PaperRecord]) -> usize {
        let mut merged = 0;
        for incoming in updated {
            if let Some(slot) = self.records.iter_mut().find(|r| r.is_matched_by(incoming)) {
                *slot = incoming.clone();
                merged += 1;
            }
        }
        merged
    }

    /// Records with a local PDF
    pub fn parse_candidates(&self) -> Vec<PaperRecord> {
        self.records.iter().filter(|r| r.is_parse_candidate()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadStatus, RecordParseStatus};

    fn record(id: &str, file: &str, title: &str) -> PaperRecord {
        PaperRecord::new(id, title, DownloadStatus::Downloaded).with_file_name(file)
    }

    fn parsed(mut r: PaperRecord, innovation: &str) -> PaperRecord {
        r.parse_status = Some(RecordParseStatus::Succeeded);
        r.innovation = Some(innovation.to_string());
        r
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        store.replace_all(vec![
            record("2401.00001v1", "a.pdf", "Alpha"),
            record("2401.00002v1", "b.pdf", "Beta"),
            record("2401.00003v2", "c.pdf", "Gamma"),
        ]);
        store
    }

    #[test]
    fn test_merge_keeps_length_and_unmatched_records() {
        let mut store = store();
        let before = store.clone();
        let incoming = vec![
            parsed(record("2401.00002v1", "b.pdf", "Beta"), "new idea"),
            parsed(record("9999.99999v1", "z.pdf", "Unknown"), "dropped"),
        ];

        let merged = store.merge_parse_results(&incoming);

        assert_eq!(merged, 1);
        assert_eq!(store.len(), before.len());
        assert_eq!(store.records()[0], before.records()[0]);
        assert_eq!(store.records()[2], before.records()[2]);
        assert_eq!(store.records()[1].innovation.as_deref(), Some("new idea"));
        assert!(store.records().iter().all(|r| r.identity != "9999.99999v1"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let incoming = vec![
            parsed(record("2401.00001v1", "a.pdf", "Alpha"), "x"),
            parsed(record("2401.00003v2", "c.pdf", "Gamma"), "y"),
        ];
        let mut once = store();
        once.merge_parse_results(&incoming);
        let mut twice = once.clone();
        twice.merge_parse_results(&incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_falls_back_to_file_name() {
        let mut store = RecordStore::new();
        store.replace_all(vec![record("", "local.pdf", "Local paper"), record("2401.00009v1", "n.pdf", "N")]);

        let incoming = parsed(record("", "local.pdf", "Renamed by parser"), "found");
        assert_eq!(store.merge_parse_results(&[incoming]), 1);
        assert_eq!(store.records()[0].innovation.as_deref(), Some("found"));
        assert_eq!(store.records()[0].title, "Renamed by parser");
    }

    #[test]
    fn test_merge_by_file_name_when_stored_has_identity() {
        let mut store = store();
        let incoming = parsed(record("", "a.pdf", "Alpha"), "matched by file");

        assert_eq!(store.merge_parse_results(&[incoming]), 1);
        assert_eq!(store.len(), 3);
        assert_eq!(store.records()[0].parse_status, Some(RecordParseStatus::Succeeded));
        assert_eq!(store.records()[0].innovation.as_deref(), Some("matched by file"));
        assert!(store.records()[1].parse_status.is_none());
    }

    #[test]
    fn test_merge_falls_back_to_title() {
        let mut store = RecordStore::new();
        let mut bare = PaperRecord::new("", "Only a title", DownloadStatus::AlreadyExists);
        bare.file_name = None;
        store.replace_all(vec![bare.clone()]);

        assert_eq!(store.merge_parse_results(&[parsed(bare, "t")]), 1);
        assert_eq!(store.records()[0].parse_status, Some(RecordParseStatus::Succeeded));
    }

    #[test]
    fn test_merge_ignores_keyless_records() {
        let mut store = store();
        let before = store.clone();
        let keyless = PaperRecord::new("", "", DownloadStatus::Downloaded);
        assert_eq!(store.merge_parse_results(&[keyless]), 0);
        assert_eq!(store, before);
    }

    #[test]
    fn test_parse_candidates_skip_failed_downloads() {
        let mut store = store();
        let mut failed = record("2401.00004v1", "d.pdf", "Delta");
        failed.download_status = DownloadStatus::Failed;
        let mut records = store.records().to_vec();
        records.push(failed);
        store.replace_all(records);

        assert_eq!(store.len(), 4);
        assert_eq!(store.parse_candidates().len(), 3);
    }
}
