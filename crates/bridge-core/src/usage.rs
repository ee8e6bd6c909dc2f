//! Token accounting and the per-session decision log

use std::collections::VecDeque;

use crate::anthropic::Decision;
use crate::protocol::Action;

/// Token prices in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Cumulative decision-service usage for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTracker {
    /// Consultations attempted
    pub calls: u64,
    /// Consultations that produced no text
    pub failed_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    rates: Option<CostRates>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(rates: Option<CostRates>) -> Self {
        Self {
            rates,
            ..Self::default()
        }
    }

    pub fn record(&mut self, decision: &Decision) {
        self.calls += 1;
        if decision.is_failure() {
            self.failed_calls += 1;
        }
        self.input_tokens += decision.input_tokens;
        self.output_tokens += decision.output_tokens;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn avg_tokens_per_call(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_tokens() as f64 / self.calls as f64
        }
    }

    /// Estimated spend, when rates are configured
    pub fn cost_usd(&self) -> Option<f64> {
        self.rates.map(|r| {
            (self.input_tokens as f64 * r.input_per_mtok
                + self.output_tokens as f64 * r.output_per_mtok)
                / 1_000_000.0
        })
    }
}

/// One consultation of the decision service
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    /// Session tick counter (1-based)
    pub tick: u64,
    /// Tick number reported by the simulation, if any
    pub sim_tick: Option<u64>,
    pub action: Action,
    pub monologue: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Bounded log of recent decisions; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct DecisionLog {
    entries: VecDeque<DecisionRecord>,
    capacity: usize,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn record(&mut self, entry: DecisionRecord) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&DecisionRecord> {
        self.entries.back()
    }

    pub fn into_vec(self) -> Vec<DecisionRecord> {
        self.entries.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: u64) -> DecisionRecord {
        DecisionRecord {
            tick,
            sim_tick: Some(tick * 10),
            action: Action::wait(),
            monologue: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = UsageTracker::new();
        usage.record(&Decision::answered("a", 100, 20));
        usage.record(&Decision::failed());
        usage.record(&Decision::answered("b", 50, 10));

        assert_eq!(usage.calls, 3);
        assert_eq!(usage.failed_calls, 1);
        assert_eq!(usage.input_tokens, 150);
        assert_eq!(usage.output_tokens, 30);
        assert_eq!(usage.total_tokens(), 180);
        assert!((usage.avg_tokens_per_call() - 60.0).abs() < f64::EPSILON);
        assert!(usage.cost_usd().is_none());
    }

    #[test]
    fn test_cost_estimate() {
        let mut usage = UsageTracker::with_rates(Some(CostRates {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        }));
        usage.record(&Decision::answered("a", 1_000_000, 100_000));

        let cost = usage.cost_usd().unwrap();
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tracker_average() {
        assert_eq!(UsageTracker::new().avg_tokens_per_call(), 0.0);
    }

    #[test]
    fn test_decision_log_evicts_oldest() {
        let mut log = DecisionLog::new(2);
        log.record(record(1));
        log.record(record(11));
        log.record(record(21));

        assert_eq!(log.len(), 2);
        let ticks: Vec<u64> = log.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![11, 21]);
        assert_eq!(log.last().unwrap().sim_tick, Some(210));
    }

    #[test]
    fn test_zero_capacity_log_keeps_nothing() {
        let mut log = DecisionLog::new(0);
        log.record(record(1));
        assert!(log.is_empty());
    }
}
