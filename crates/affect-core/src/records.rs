//! Attendance / audit log of registration and recognition events.

use crate::emotion::EmotionLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Immutable log entry. Optional fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub name: String,
    pub gender: Option<String>,
    pub gender_probability: Option<f64>,
    pub emotion: Option<EmotionLabel>,
    /// RFC 3339.
    pub timestamp: String,
    pub location: Option<GeoLocation>,
    pub confidence: Option<f64>,
}

impl AnalysisRecord {
    /// Record for a freshly registered identity.
    pub fn registration(name: &str, gender: String, gender_probability: f64) -> Self {
        Self {
            name: name.to_string(),
            gender: Some(gender),
            gender_probability: Some(gender_probability),
            emotion: None,
            timestamp: now_rfc3339(),
            location: None,
            confidence: None,
        }
    }
}

/// Per-name view of one attendance entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEntry {
    pub timestamp: String,
    pub emotion: Option<EmotionLabel>,
    pub location: Option<GeoLocation>,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Append-only list of analysis records.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLog {
    records: Vec<AnalysisRecord>,
}

impl AttendanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: AnalysisRecord) {
        self.records.push(record);
    }

    /// All records in append order.
    pub fn records(&self) -> &[AnalysisRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&AnalysisRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Entries grouped by name; each group keeps append order.
    pub fn by_name(&self) -> BTreeMap<String, Vec<AttendanceEntry>> {
        let mut grouped: BTreeMap<String, Vec<AttendanceEntry>> = BTreeMap::new();
        for r in &self.records {
            grouped.entry(r.name.clone()).or_default().push(AttendanceEntry {
                timestamp: r.timestamp.clone(),
                emotion: r.emotion,
                location: r.location,
            });
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(name: &str, ts: &str, emotion: Option<EmotionLabel>) -> AnalysisRecord {
        AnalysisRecord {
            name: name.into(),
            gender: None,
            gender_probability: None,
            emotion,
            timestamp: ts.into(),
            location: None,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_append_order_and_last() {
        let mut log = AttendanceLog::new();
        log.append(seen("bob", "2026-01-01T10:00:00Z", None));
        log.append(seen("alice", "2026-01-01T10:01:00Z", None));
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].name, "bob");
        assert_eq!(log.last().unwrap().name, "alice");
    }

    #[test]
    fn test_by_name_groups() {
        let mut log = AttendanceLog::new();
        log.append(seen("bob", "t1", Some(EmotionLabel::Happy)));
        log.append(seen("alice", "t2", None));
        log.append(seen("bob", "t3", Some(EmotionLabel::Sad)));

        let grouped = log.by_name();
        assert_eq!(grouped.len(), 2);
        let bob = &grouped["bob"];
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[0].timestamp, "t1");
        assert_eq!(bob[1].emotion, Some(EmotionLabel::Sad));
    }

    #[test]
    fn test_record_serializes_nulls() {
        let r = AnalysisRecord::registration("carol", "female".into(), 0.93);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["genderProbability"], 0.93);
        assert!(json["location"].is_null());
        assert!(json["emotion"].is_null());
        assert!(chrono::DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
    }
}
