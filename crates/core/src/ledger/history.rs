use std::collections::VecDeque;

use super::LiquidationRecord;

/// Bounded most-recent-first history. Index 0 is the newest record.
#[derive(Debug)]
pub(crate) struct History {
    records: VecDeque<LiquidationRecord>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest entry when full.
    pub(crate) fn push(&mut self, record: LiquidationRecord) -> Option<LiquidationRecord> {
        self.records.push_front(record);
        if self.records.len() > self.capacity {
            self.records.pop_back()
        } else {
            None
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &LiquidationRecord> {
        self.records.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(n: usize) -> LiquidationRecord {
        LiquidationRecord {
            loan_id: format!("loan-{}", n),
            loan_pda: String::new(),
            token_mint: "mint".to_string(),
            token_symbol: "MEME".to_string(),
            expected_sol_recovery: 100,
            actual_sol_recovery: 100,
            loss_bps: 0,
            timestamp: Utc::now(),
            auto_blacklisted: false,
            tx_signature: None,
        }
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut history = History::new(3);
        for n in 0..3 {
            assert!(history.push(record(n)).is_none());
        }
        let evicted = history.push(record(3)).unwrap();
        assert_eq!(evicted.loan_id, "loan-0");
        assert_eq!(history.len(), 3);

        let ids: Vec<_> = history.iter().map(|r| r.loan_id.as_str()).collect();
        assert_eq!(ids, vec!["loan-3", "loan-2", "loan-1"]);
    }
}
