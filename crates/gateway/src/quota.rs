// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monthly call-quota accounting: count-then-charge against the usage log,
//! no materialized counter. See the module doc on [`QuotaAccountant`] for
//! the accepted over-grant trade-off.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::UsageLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Agency,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Agency => "agency",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Monthly call budget per plan, `None` meaning unbounded.
const PLAN_TABLE: [(Plan, Option<u64>); 4] = [
    (Plan::Free, Some(50)),
    (Plan::Pro, Some(2_000)),
    (Plan::Agency, Some(10_000)),
    (Plan::Enterprise, None),
];

const UNVERIFIED_FREE_LIMIT: u64 = 10;

fn effective_limit(plan: Plan, verified: bool) -> Option<u64> {
    if plan == Plan::Free && !verified {
        return Some(UNVERIFIED_FREE_LIMIT);
    }
    PLAN_TABLE.iter().find(|(p, _)| *p == plan).and_then(|(_, limit)| *limit)
}

/// The first instant of the current calendar month in UTC.
pub fn month_start_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single().unwrap_or(now)
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: u64,
    pub limit: Option<u64>,
}

/// Counts usage-log rows for the tenant since month-start and compares
/// against the plan's limit. Does not itself write a row — the pipeline
/// writes exactly one usage-log row per attempt regardless of outcome,
/// which is what keeps subsequent checks consistent.
///
/// This accepts a small over-grant window under high concurrency: two
/// concurrent checks may both observe `used == limit - 1` and both allow.
/// A stricter deployment would replace this count-then-log sequence with an
/// atomic conditional increment in the usage store; this accountant trades
/// that guarantee for a much simpler implementation, as called out in the
/// accountant's own contract.
pub struct QuotaAccountant {
    usage_log: Arc<dyn UsageLog>,
}

impl QuotaAccountant {
    pub fn new(usage_log: Arc<dyn UsageLog>) -> Self {
        Self { usage_log }
    }

    pub fn check(&self, tenant_id: &str, plan: Plan, verified: bool, now: DateTime<Utc>) -> QuotaDecision {
        let limit = effective_limit(plan, verified);
        let Some(limit) = limit else {
            return QuotaDecision { allowed: true, used: 0, limit: None };
        };
        let used = self.usage_log.count_since(tenant_id, month_start_utc(now));
        QuotaDecision { allowed: used < limit, used, limit: Some(limit) }
    }
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
