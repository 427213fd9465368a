// Adaptation Audit Log
//
// Append-only record of every retraining cycle transition.
// Sequence numbers start at 1 and never skip.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::registry::VersionId;

/// Position of an entry in the log.
pub type SequenceNumber = u64;

/// What happened in a retraining cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdaptationEvent {
    Triggered {
        feedback_count: usize,
    },
    Completed {
        feedback_count: usize,
        adapter_version: VersionId,
    },
    Failed {
        reason: String,
    },
}

impl AdaptationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AdaptationEvent::Triggered { .. } => EventKind::Triggered,
            AdaptationEvent::Completed { .. } => EventKind::Completed,
            AdaptationEvent::Failed { .. } => EventKind::Failed,
        }
    }

    pub fn feedback_count(&self) -> Option<usize> {
        match self {
            AdaptationEvent::Triggered { feedback_count }
            | AdaptationEvent::Completed { feedback_count, .. } => Some(*feedback_count),
            AdaptationEvent::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Triggered,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationLogEntry {
    pub sequence_number: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AdaptationEvent,
}

#[derive(Debug, Default)]
pub struct AdaptationLog {
    entries: RwLock<Vec<AdaptationLogEntry>>,
}

impl AdaptationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` under the next sequence number.
    pub fn append(&self, event: AdaptationEvent) -> AdaptationLogEntry {
        let mut entries = self.entries.write();
        let entry = AdaptationLogEntry {
            sequence_number: entries.last().map(|e| e.sequence_number + 1).unwrap_or(1),
            timestamp: Utc::now(),
            event,
        };
        entries.push(entry.clone());
        entry
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<AdaptationLogEntry> {
        self.entries.read().clone()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        self.entries
            .read()
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequence_numbers_are_gap_free_across_event_kinds() {
        let log = AdaptationLog::new();
        log.append(AdaptationEvent::Triggered { feedback_count: 3 });
        log.append(AdaptationEvent::Completed {
            feedback_count: 3,
            adapter_version: 1,
        });
        log.append(AdaptationEvent::Triggered { feedback_count: 1 });
        log.append(AdaptationEvent::Failed {
            reason: "runner crashed".into(),
        });
        log.append(AdaptationEvent::Triggered { feedback_count: 4 });

        let numbers: Vec<_> = log.entries().iter().map(|e| e.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(log.current_sequence(), 5);
    }

    #[test]
    fn concurrent_appends_stay_gap_free() {
        let log = std::sync::Arc::new(AdaptationLog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        log.append(AdaptationEvent::Triggered { feedback_count: 1 });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 400);
        for (index, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence_number, index as u64 + 1);
        }
    }

    #[test]
    fn feedback_count_only_on_triggered_and_completed() {
        let log = AdaptationLog::new();
        let triggered = log.append(AdaptationEvent::Triggered { feedback_count: 2 });
        let failed = log.append(AdaptationEvent::Failed {
            reason: "cancelled".into(),
        });

        let triggered = serde_json::to_value(&triggered).unwrap();
        assert_eq!(triggered["event"], "triggered");
        assert_eq!(triggered["feedback_count"], 2);
        assert_eq!(triggered["sequence_number"], 1);

        let failed_json = serde_json::to_value(&failed).unwrap();
        assert_eq!(failed_json["event"], "failed");
        assert!(failed_json.get("feedback_count").is_none());
        assert_eq!(failed.event.kind(), EventKind::Failed);
        assert_eq!(failed.event.feedback_count(), None);
    }

    #[test]
    fn entries_round_trip_through_json() {
        let log = AdaptationLog::new();
        log.append(AdaptationEvent::Completed {
            feedback_count: 3,
            adapter_version: 7,
        });

        let json = serde_json::to_string(&log.entries()).unwrap();
        let parsed: Vec<AdaptationLogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, log.entries());
    }
}
