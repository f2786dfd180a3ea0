//! Pre- and post-persist notifications.

use dcgen_proto::Ident;
use parking_lot::Mutex;
use tracing::debug;

use crate::record::Record;

/// Receives a record right before and right after it is saved.
///
/// `original` is the stored state before the save, `None` for new records.
/// Notifications are advisory: the save happens regardless.
pub trait PersistListener: Send + Sync {
    /// Called before the record is saved.
    fn pre_persist(&self, record: &Record, original: Option<&Record>);

    /// Called after the record is saved.
    fn post_persist(&self, record: &Record, original: Option<&Record>);
}

/// Logs every notification at debug level.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl PersistListener for LoggingListener {
    fn pre_persist(&self, record: &Record, original: Option<&Record>) {
        debug!(
            record_type = record.record_type(),
            id = ?record.id(),
            update = original.is_some(),
            "pre persist"
        );
    }

    fn post_persist(&self, record: &Record, original: Option<&Record>) {
        debug!(
            record_type = record.record_type(),
            id = ?record.id(),
            update = original.is_some(),
            "post persist"
        );
    }
}

/// Phase of a persist notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistPhase {
    /// Before the save.
    Pre,
    /// After the save.
    Post,
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistEvent {
    /// Phase.
    pub phase: PersistPhase,
    /// Record type.
    pub record_type: String,
    /// Record id at notification time (`None` before the first save).
    pub id: Option<Ident>,
    /// Whether a stored original was passed.
    pub had_original: bool,
}

/// Records every notification.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<PersistEvent>>,
}

impl RecordingListener {
    /// Create an empty listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications so far.
    pub fn events(&self) -> Vec<PersistEvent> {
        self.events.lock().clone()
    }

    /// Number of notifications so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn record(&self, phase: PersistPhase, record: &Record, original: Option<&Record>) {
        self.events.lock().push(PersistEvent {
            phase,
            record_type: record.record_type().to_string(),
            id: record.id().cloned(),
            had_original: original.is_some(),
        });
    }
}

impl PersistListener for RecordingListener {
    fn pre_persist(&self, record: &Record, original: Option<&Record>) {
        self.record(PersistPhase::Pre, record, original);
    }

    fn post_persist(&self, record: &Record, original: Option<&Record>) {
        self.record(PersistPhase::Post, record, original);
    }
}
