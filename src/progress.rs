//! Progress reporting for long imports.

/// Where an import currently is. One stage draws one bar in the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Stage label, e.g. "Linking relations".
    pub stage: &'static str,
    /// Items done so far in this stage.
    pub done: u64,
    /// Items expected in this stage. `None` while streaming a source of unknown length.
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Called after every committed batch. Return `false` to cancel: the batch in flight is rolled
/// back and the import fails with `WikiliteError::Cancelled`.
///
/// `Send + Sync` so the import can run on a blocking worker thread.
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate) -> bool + Send + Sync>;

impl ProgressUpdate {
    pub fn new(stage: &'static str, done: u64, total: Option<u64>) -> Self {
        ProgressUpdate {
            stage,
            done,
            total,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True once `done` has reached a known total.
    pub fn is_finished(&self) -> bool {
        self.total.is_some_and(|total| self.done >= total)
    }
}

/// Returns `false` when the callback asked to cancel.
pub(crate) fn report(callback: &mut Option<ProgressCallback>, update: ProgressUpdate) -> bool {
    match callback.as_mut() {
        Some(cb) => cb(update),
        None => true,
    }
}
