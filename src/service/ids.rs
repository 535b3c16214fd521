use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out millisecond timestamps that never repeat within the process,
/// even when several records are created in the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        loop {
            let prev = self.last.load(Ordering::Acquire);
            let next = now.max(prev + 1);
            if self
                .last
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Next token not already used by the target collection.
    pub fn fresh_id(&self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.next_token().to_string();
            if !taken(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_strictly_increasing() {
        let ids = IdGenerator::new();
        let mut prev = ids.next_token();
        for _ in 0..1000 {
            let next = ids.next_token();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn fresh_id_skips_taken_values() {
        let ids = IdGenerator::new();
        let first = ids.next_token();
        let taken: HashSet<String> = (first + 1..first + 50).map(|v| v.to_string()).collect();
        let id = ids.fresh_id(|c| taken.contains(c));
        assert!(!taken.contains(&id));
    }
}
