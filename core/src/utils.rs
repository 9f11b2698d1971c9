//! Small shared utilities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, checked between packets.
///
/// Cloning shares the underlying flag; cancel from any clone is observed by
/// all others. No async runtime is involved; a plain atomic flag is enough
/// for a single-threaded, one-shot pass.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Converts a microsecond capture timestamp to an RFC 3339 UTC string.
pub fn ts_micros_to_rfc3339(ts_micros: i64) -> Option<String> {
    use chrono::{TimeZone, Utc};
    match Utc.timestamp_micros(ts_micros) {
        chrono::LocalResult::Single(dt) => Some(dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        _ => None,
    }
}
