//! Drops repeated deliveries of the same photo message.

use std::time::Duration;

use moka::future::Cache;

/// Upper bound on remembered message ids.
const MAX_ENTRIES: u64 = 10_000;

/// A bounded, time-windowed set of `(chat_id, message_id)` pairs.
#[derive(Clone)]
pub struct DedupCache {
    seen: Cache<(i64, i64), ()>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(window)
                .build(),
        }
    }

    /// `true` the first time a message is seen within the window.
    ///
    /// The check and the insert are one atomic cache operation, so two
    /// concurrent deliveries cannot both be first.
    pub async fn first_sighting(&self, chat_id: i64, message_id: i64) -> bool {
        self.seen
            .entry((chat_id, message_id))
            .or_insert(())
            .await
            .is_fresh()
    }
}
