//! Notice handlers.
//!
//! NoticeResponse messages never touch the in-flight result. They are passed
//! to the connection's [`NoticeHandler`] as soon as they are parsed, in any
//! connection state.

use crate::error::ErrorRecord;

/// Receives server notices and locally generated warnings.
pub trait NoticeHandler {
    /// Called once per notice. The record's composed message is already
    /// formatted with the connection's verbosity.
    fn notice(&mut self, notice: &ErrorRecord);
}

/// Default handler: forwards notices to `tracing`.
#[derive(Debug, Default)]
pub struct LogNoticeHandler;

impl NoticeHandler for LogNoticeHandler {
    fn notice(&mut self, notice: &ErrorRecord) {
        match notice.severity() {
            Some("WARNING") => tracing::warn!("{}", notice),
            _ => tracing::info!("{}", notice),
        }
    }
}

/// A handler that keeps every notice.
#[derive(Debug, Default)]
pub struct CollectNoticeHandler {
    notices: Vec<ErrorRecord>,
}

impl CollectNoticeHandler {
    /// Create a new collecting handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices received so far.
    pub fn notices(&self) -> &[ErrorRecord] {
        &self.notices
    }

    /// Take the collected notices.
    pub fn into_notices(self) -> Vec<ErrorRecord> {
        self.notices
    }
}

impl NoticeHandler for CollectNoticeHandler {
    fn notice(&mut self, notice: &ErrorRecord) {
        self.notices.push(notice.clone());
    }
}

/// A handler that discards all notices.
#[derive(Debug, Default)]
pub struct DropNoticeHandler;

impl NoticeHandler for DropNoticeHandler {
    fn notice(&mut self, _notice: &ErrorRecord) {}
}

impl<F: FnMut(&ErrorRecord)> NoticeHandler for F {
    fn notice(&mut self, notice: &ErrorRecord) {
        self(notice)
    }
}
