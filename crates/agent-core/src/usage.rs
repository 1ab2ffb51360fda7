//! Usage Accounting
//!
//! Per-request token and cost totals, accumulated across every model call
//! made while answering one question.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::provider::{ModelPricing, TokenUsage};

/// Final token/cost record for one request
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tokens_used: u64,
    pub cost: f64,
}

#[derive(Debug, Default)]
struct Totals {
    record: UsageRecord,
    calls: u32,
}

/// Thread-safe accumulator shared by the agent loop and model-backed tools
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: Mutex<Totals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model call
    pub fn record(&self, usage: &TokenUsage, pricing: &ModelPricing) {
        let cost = pricing.cost(usage).max(0.0);
        {
            let mut totals = self.lock();
            totals.record.tokens_used += u64::from(usage.total_tokens);
            totals.record.cost += cost;
            totals.calls += 1;
        }
        tracing::debug!(tokens = usage.total_tokens, cost, "model usage recorded");
    }

    /// Number of model calls recorded so far
    pub fn calls(&self) -> u32 {
        self.lock().calls
    }

    pub fn snapshot(&self) -> UsageRecord {
        self.lock().record
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
