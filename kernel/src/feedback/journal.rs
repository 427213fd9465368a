// Feedback Journal
//
// Durability contract for accepted corrections. The pool itself is
// in-memory; the journal keeps every correction ever accepted.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::FeedbackItem;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Storage backend for accepted feedback.
///
/// Implementations MUST NOT:
/// - Reorder items
/// - Rewrite or truncate earlier items
pub trait FeedbackJournal: Send + Sync {
    fn append(&self, item: &FeedbackItem) -> Result<(), JournalError>;

    /// Load all journaled items in order.
    fn load(&self) -> Result<Vec<FeedbackItem>, JournalError>;
}

/// One JSON object per line, appended and flushed per item.
#[derive(Debug)]
pub struct JsonlJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlJournal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeedbackJournal for JsonlJournal {
    fn append(&self, item: &FeedbackItem) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<FeedbackItem>, JournalError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut items = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }
        Ok(items)
    }
}
