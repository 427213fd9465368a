// Feedback Pool
//
// Holds human corrections that have not yet been folded into a
// training batch. Drain hands the whole pool over in one swap.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod journal;

pub use journal::{FeedbackJournal, JournalError, JsonlJournal};

/// Stable identifier for a single correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackId(pub Uuid);

impl FeedbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedbackId {
    fn default() -> Self {
        Self::new()
    }
}

/// A human correction of one model completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    #[serde(default)]
    pub id: FeedbackId,
    pub prompt: String,
    pub original_completion: String,
    pub corrected_completion: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl FeedbackItem {
    pub fn new(
        prompt: impl Into<String>,
        original_completion: impl Into<String>,
        corrected_completion: impl Into<String>,
    ) -> Self {
        Self {
            id: FeedbackId::new(),
            prompt: prompt.into(),
            original_completion: original_completion.into(),
            corrected_completion: corrected_completion.into(),
            received_at: Utc::now(),
        }
    }

    /// Reject items with any blank text field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("prompt", &self.prompt),
            ("original_completion", &self.original_completion),
            ("corrected_completion", &self.corrected_completion),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("feedback field `{0}` is empty")]
    EmptyField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitFeedbackError {
    #[error("invalid feedback: {0}")]
    Validation(#[from] ValidationError),

    #[error("feedback journal write failed: {0}")]
    Journal(#[from] JournalError),
}

/// Pending corrections, in arrival order.
///
/// Guarantees:
/// - size only grows between drains
/// - a drain returns every held item exactly once
#[derive(Default)]
pub struct FeedbackPool {
    items: Mutex<VecDeque<FeedbackItem>>,
    journal: Option<Arc<dyn FeedbackJournal>>,
}

impl FeedbackPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every accepted item into `journal` before it enters the pool.
    pub fn with_journal(journal: Arc<dyn FeedbackJournal>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            journal: Some(journal),
        }
    }

    /// Validate, journal, then append. Returns the pool size after insertion.
    ///
    /// The journal write happens under the pool lock so the journal and
    /// the pool see submissions in the same order.
    pub fn submit(&self, item: FeedbackItem) -> Result<usize, SubmitFeedbackError> {
        item.validate()?;

        let mut items = self.items.lock();
        if let Some(journal) = &self.journal {
            journal.append(&item)?;
        }
        items.push_back(item);
        Ok(items.len())
    }

    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Take every held item, leaving a fresh empty pool behind.
    pub fn drain(&self) -> Vec<FeedbackItem> {
        let taken = std::mem::take(&mut *self.items.lock());
        Vec::from(taken)
    }

    /// Put a previously drained batch back ahead of anything submitted since.
    pub fn requeue(&self, batch: Vec<FeedbackItem>) {
        let mut items = self.items.lock();
        for item in batch.into_iter().rev() {
            items.push_front(item);
        }
    }
}

impl std::fmt::Debug for FeedbackPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackPool")
            .field("size", &self.size())
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}
