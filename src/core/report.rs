//! Cost report generation.
//!
//! Loads settled purchases from the database, runs the cost calculator over them
//! (overall and per user) and formats the result as plain text. The formatting helpers
//! are framework-agnostic so any front end can reuse them.

use crate::{
    core::cost::{self, CostEntry, CostSummary, DateRange},
    entities::{TokenPurchase, UserContribution, token_purchase, user_contribution},
    errors::Result,
};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cost report over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    /// Purchase dates included
    pub range: DateRange,
    /// Totals over every contribution in range
    pub overall: CostSummary,
    /// Totals per contributing user
    pub per_user: BTreeMap<String, CostSummary>,
    /// Purchases in range still waiting for their contribution
    pub unsettled_purchases: usize,
}

/// Loads every purchase in `range`, oldest first, paired with its contribution.
async fn load_purchases(
    db: &DatabaseConnection,
    range: &DateRange,
) -> Result<Vec<(token_purchase::Model, Option<user_contribution::Model>)>> {
    let mut query = TokenPurchase::find();
    if let Some(start) = range.start {
        query = query.filter(token_purchase::Column::PurchaseDate.gte(start));
    }
    if let Some(end) = range.end {
        query = query.filter(token_purchase::Column::PurchaseDate.lte(end));
    }

    query
        .find_also_related(UserContribution)
        .order_by_asc(token_purchase::Column::PurchaseDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads the settled purchases in `range` as calculator entries.
pub async fn load_cost_entries(db: &DatabaseConnection, range: &DateRange) -> Result<Vec<CostEntry>> {
    Ok(load_purchases(db, range)
        .await?
        .into_iter()
        .filter_map(|(purchase, contribution)| contribution.map(|c| (purchase, c)))
        .collect())
}

/// Generates the cost report for `range`.
pub async fn generate_cost_report(db: &DatabaseConnection, range: DateRange) -> Result<CostReport> {
    let purchases = load_purchases(db, &range).await?;
    let unsettled_purchases = purchases.iter().filter(|(_, c)| c.is_none()).count();
    let entries: Vec<CostEntry> = purchases
        .into_iter()
        .filter_map(|(purchase, contribution)| contribution.map(|c| (purchase, c)))
        .collect();

    Ok(CostReport {
        range,
        overall: cost::calculate_costs(&entries, &range),
        per_user: cost::summarize_by_user(&entries, &range),
        unsettled_purchases,
    })
}

/// Generates a bar string for a 0-100 percentage.
///
/// Creates a text-based bar like: `[████████░░] 80.0%`
#[must_use]
pub fn format_progress_bar(percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    // Cast safety: clamped ∈ [0, 100], length is small (10-20).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!("[{}{}] {percent:.1}%", "█".repeat(filled), "░".repeat(empty))
}

/// Formats an amount with its sign and currency symbol, like "+$50.00" or "-$2.00".
#[must_use]
pub fn format_amount(amount: f64, symbol: &str) -> String {
    if amount >= 0.0 {
        format!("+{symbol}{amount:.2}")
    } else {
        format!("-{symbol}{:.2}", amount.abs())
    }
}

fn format_summary_lines(summary: &CostSummary, symbol: &str, indent: &str) -> String {
    format!(
        "{indent}Contributions: {} | Tokens used: {:.2}\n\
         {indent}Paid: {symbol}{:.2} | True cost: {symbol}{:.2} | Overpayment: {}\n\
         {indent}Efficiency: {}\n\
         {indent}Emergency premium: {}\n",
        summary.contribution_count,
        summary.total_tokens_used,
        summary.total_amount_paid,
        summary.total_true_cost,
        format_amount(summary.overpayment, symbol),
        format_progress_bar(summary.efficiency, None),
        format_amount(summary.emergency_premium, symbol),
    )
}

fn format_range(range: &DateRange) -> String {
    let fmt = |date: Option<DateTimeUtc>| {
        date.map_or_else(|| "…".to_string(), |d| d.format("%Y-%m-%d").to_string())
    };
    match (range.start, range.end) {
        (None, None) => "all purchases".to_string(),
        (start, end) => format!("{} to {}", fmt(start), fmt(end)),
    }
}

/// Formats a cost report into a human-readable summary.
#[must_use]
pub fn format_cost_report(report: &CostReport, symbol: &str) -> String {
    let mut out = format!("Token cost report - {}\n", format_range(&report.range));
    out.push_str(&format_summary_lines(&report.overall, symbol, "  "));
    if report.unsettled_purchases > 0 {
        out.push_str(&format!(
            "  Awaiting contribution: {} purchase(s)\n",
            report.unsettled_purchases
        ));
    }

    for (user_id, summary) in &report.per_user {
        out.push_str(&format!("\n  {user_id}\n"));
        out.push_str(&format_summary_lines(summary, symbol, "    "));
    }

    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_format_progress_bar() {
        assert_eq!(format_progress_bar(100.0, Some(10)), "[██████████] 100.0%");
        assert_eq!(format_progress_bar(90.0, Some(10)), "[█████████░] 90.0%");
        assert_eq!(format_progress_bar(0.0, Some(10)), "[░░░░░░░░░░] 0.0%");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(50.0, "$"), "+$50.00");
        assert_eq!(format_amount(-2.0, "$"), "-$2.00");
        assert_eq!(format_amount(0.0, "R"), "+R0.00");
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range(&DateRange::all()), "all purchases");
        assert_eq!(
            format_range(&DateRange::between(day(2024, 1, 1), day(2024, 2, 1))),
            "2024-01-01 to 2024-02-01"
        );
    }

    #[tokio::test]
    async fn test_generate_cost_report() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        insert_contribution(&db, first.id, "alice", 40.0, 40.0, 18.0).await?;
        insert_purchase(&db, day(2024, 1, 9), 100.0, 50.0, 40.0).await?;

        let report = generate_cost_report(&db, DateRange::all()).await?;
        assert_eq!(report.overall.contribution_count, 1);
        assert_eq!(report.overall.total_true_cost, 20.0);
        assert_eq!(report.overall.overpayment, -2.0);
        assert_eq!(report.unsettled_purchases, 1);
        assert!(report.per_user.contains_key("alice"));

        let text = format_cost_report(&report, "$");
        assert!(text.starts_with("Token cost report - all purchases"));
        assert!(text.contains("Overpayment: -$2.00"));
        assert!(text.contains("Awaiting contribution: 1 purchase(s)"));
        assert!(text.contains("  alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_cost_entries_respects_range() -> Result<()> {
        let db = setup_test_db().await?;
        let first = insert_purchase(&db, day(2024, 1, 1), 100.0, 50.0, 0.0).await?;
        insert_contribution(&db, first.id, "alice", 40.0, 40.0, 18.0).await?;
        let second = insert_purchase(&db, day(2024, 2, 1), 100.0, 50.0, 40.0).await?;
        insert_contribution(&db, second.id, "bob", 100.0, 60.0, 30.0).await?;

        assert_eq!(load_cost_entries(&db, &DateRange::all()).await?.len(), 2);

        let entries = load_cost_entries(&db, &DateRange::since(day(2024, 1, 15))).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.user_id, "bob");
        Ok(())
    }
}
