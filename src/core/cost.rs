//! Cost and efficiency calculations over settled purchases.
//!
//! Each contributor's true cost is their share of the price-per-token of the purchase
//! they drew from. Efficiency compares what was paid with that true cost, and the
//! emergency premium is the extra paid for tokens bought at emergency rates compared
//! with the average regular rate. All divisions are guarded and yield `0.0`.

use crate::entities::{token_purchase, user_contribution};
use sea_orm::prelude::DateTimeUtc;
use serde::Serialize;
use std::collections::BTreeMap;

/// A purchase together with the contribution that settled it.
pub type CostEntry = (token_purchase::Model, user_contribution::Model);

/// Inclusive range of purchase dates to include. Open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateRange {
    /// First purchase date included
    pub start: Option<DateTimeUtc>,
    /// Last purchase date included
    pub end: Option<DateTimeUtc>,
}

impl DateRange {
    /// Every date.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Dates from `start` onwards.
    #[must_use]
    pub const fn since(start: DateTimeUtc) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Dates between `start` and `end`, both included.
    #[must_use]
    pub const fn between(start: DateTimeUtc, end: DateTimeUtc) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether `date` falls in the range.
    #[must_use]
    pub fn contains(&self, date: DateTimeUtc) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Totals over a set of contributions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostSummary {
    /// Number of contributions included
    pub contribution_count: usize,
    /// Tokens consumed
    pub total_tokens_used: f64,
    /// Money paid by contributors
    pub total_amount_paid: f64,
    /// Fair share of the purchase prices for the tokens consumed
    pub total_true_cost: f64,
    /// How closely payment matched true cost, 0-100
    pub efficiency: f64,
    /// Paid minus true cost; negative means underpaid
    pub overpayment: f64,
    /// Extra cost of tokens bought in emergencies over the average regular rate
    pub emergency_premium: f64,
}

/// Price per token, `0.0` for a purchase without tokens.
#[must_use]
pub fn price_per_token(total_payment: f64, total_tokens: f64) -> f64 {
    if total_tokens > 0.0 && total_tokens.is_finite() && total_payment.is_finite() {
        total_payment / total_tokens
    } else {
        0.0
    }
}

/// `100 * min / max` of the two totals, clamped to 0-100; `0.0` when both are zero.
#[must_use]
pub fn efficiency(amount_paid: f64, true_cost: f64) -> f64 {
    let high = amount_paid.max(true_cost);
    if high <= 0.0 || !high.is_finite() {
        return 0.0;
    }
    (100.0 * amount_paid.min(true_cost) / high).clamp(0.0, 100.0)
}

/// Token-weighted price of the regular (non-emergency) purchases.
fn average_regular_rate<'a, I>(entries: I) -> f64
where
    I: IntoIterator<Item = &'a CostEntry>,
{
    let (payment, tokens) = entries
        .into_iter()
        .filter(|(purchase, _)| !purchase.is_emergency)
        .fold((0.0, 0.0), |(payment, tokens), (purchase, _)| {
            (payment + purchase.total_payment, tokens + purchase.total_tokens)
        });
    price_per_token(payment, tokens)
}

fn summarize<'a, I>(entries: I, regular_rate: f64) -> CostSummary
where
    I: IntoIterator<Item = &'a CostEntry>,
{
    let mut summary = CostSummary::default();

    for (purchase, contribution) in entries {
        let rate = purchase.price_per_token();
        summary.contribution_count += 1;
        summary.total_tokens_used += contribution.tokens_consumed;
        summary.total_amount_paid += contribution.contribution_amount;
        summary.total_true_cost += contribution.tokens_consumed * rate;

        if purchase.is_emergency && regular_rate > 0.0 {
            summary.emergency_premium += contribution.tokens_consumed * (rate - regular_rate);
        }
    }

    summary.efficiency = efficiency(summary.total_amount_paid, summary.total_true_cost);
    summary.overpayment = summary.total_amount_paid - summary.total_true_cost;
    summary
}

/// Computes the totals for all entries whose purchase date falls in `range`.
///
/// # Arguments
///
/// * `entries` - Purchases paired with the contribution that settled them
/// * `range` - Inclusive purchase date range; [`DateRange::all`] keeps every entry
///
/// # Returns
///
/// A [`CostSummary`]. Divisions with a zero denominator contribute `0.0`, so the
/// result never holds NaN.
#[must_use]
pub fn calculate_costs(entries: &[CostEntry], range: &DateRange) -> CostSummary {
    let in_range = || {
        entries
            .iter()
            .filter(|(purchase, _)| range.contains(purchase.purchase_date))
    };
    summarize(in_range(), average_regular_rate(in_range()))
}

/// Computes the totals per contributing user.
///
/// The average regular rate used for emergency premiums is taken over all entries in
/// `range`, not just the user's own.
#[must_use]
pub fn summarize_by_user(entries: &[CostEntry], range: &DateRange) -> BTreeMap<String, CostSummary> {
    let in_range: Vec<&CostEntry> = entries
        .iter()
        .filter(|(purchase, _)| range.contains(purchase.purchase_date))
        .collect();
    let regular_rate = average_regular_rate(in_range.iter().copied());

    let mut by_user: BTreeMap<String, Vec<&CostEntry>> = BTreeMap::new();
    for entry in in_range {
        by_user.entry(entry.1.user_id.clone()).or_default().push(entry);
    }

    by_user
        .into_iter()
        .map(|(user_id, user_entries)| (user_id, summarize(user_entries, regular_rate)))
        .collect()
}
