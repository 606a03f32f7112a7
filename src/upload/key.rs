use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Issues `<prefix>_<entity>_<millis>.<ext>` storage keys.
///
/// Stamps are strictly increasing per generator, so two calls in the same
/// millisecond still get distinct keys.
#[derive(Debug)]
pub struct KeyGenerator {
    prefix: String,
    extension: String,
    last_stamp: AtomicI64,
}

impl KeyGenerator {
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn next_key(&self, entity_id: &str) -> String {
        let stamp = self.reserve(Utc::now().timestamp_millis());
        self.key_at(entity_id, stamp)
    }

    pub fn key_at(&self, entity_id: &str, millis: i64) -> String {
        format!(
            "{}{}.{}",
            self.entity_prefix(entity_id),
            millis,
            self.extension
        )
    }

    /// Listing prefix shared by every key of one entity.
    pub fn entity_prefix(&self, entity_id: &str) -> String {
        format!("{}_{}_", self.prefix, entity_id)
    }

    fn reserve(&self, now: i64) -> i64 {
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = if now > last { now } else { last + 1 };
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}
