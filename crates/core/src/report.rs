use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::record::{Industry, Record, Status};

/// Headline numbers and chart series for the dashboard, computed from the
/// unpaginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: u64,
    pub active: u64,
    /// Sum of `monthlySpend` over every record.
    pub monthly_recurring_revenue: f64,
    pub lifetime_value: f64,
    pub new_this_month: u64,
    /// Records created per `YYYY-MM`, oldest month first.
    pub growth: Vec<MonthlyCount>,
    pub by_status: Vec<(Status, u64)>,
    pub by_industry: Vec<(Industry, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: u64,
}

pub fn summarize(records: &[Record], today: NaiveDate) -> DashboardSummary {
    let mut growth: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_status: BTreeMap<Status, u64> = BTreeMap::new();
    let mut by_industry: BTreeMap<Industry, u64> = BTreeMap::new();
    let mut mrr = 0.0;
    let mut ltv = 0.0;
    let mut new_this_month = 0;

    for r in records {
        *growth
            .entry(r.created_at.format("%Y-%m").to_string())
            .or_default() += 1;
        *by_status.entry(r.status).or_default() += 1;
        *by_industry.entry(r.industry).or_default() += 1;
        mrr += r.monthly_spend;
        ltv += r.lifetime_value;
        if r.created_at.year() == today.year() && r.created_at.month() == today.month() {
            new_this_month += 1;
        }
    }

    DashboardSummary {
        total: records.len() as u64,
        active: by_status.get(&Status::Active).copied().unwrap_or(0),
        monthly_recurring_revenue: mrr,
        lifetime_value: ltv,
        new_this_month,
        growth: growth
            .into_iter()
            .map(|(month, count)| MonthlyCount { month, count })
            .collect(),
        by_status: Status::ALL
            .into_iter()
            .map(|s| (s, by_status.get(&s).copied().unwrap_or(0)))
            .collect(),
        by_industry: by_industry.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn summary_counts_and_sums() {
        let mut records = testing::named_records("A", 4);
        records[0].status = Status::Active;
        records[1].status = Status::Active;
        records[2].status = Status::Inactive;
        records[0].created_at = date("2024-05-02");
        records[1].created_at = date("2024-05-20");
        records[2].created_at = date("2024-04-11");
        records[3].created_at = date("2023-05-11");
        records[3].industry = Industry::Finance;
        for r in &mut records {
            r.monthly_spend = 100.0;
            r.lifetime_value = 1000.0;
        }

        let s = summarize(&records, date("2024-05-31"));

        assert_eq!(s.total, 4);
        assert_eq!(s.active, 2);
        assert_eq!(s.monthly_recurring_revenue, 400.0);
        assert_eq!(s.lifetime_value, 4000.0);
        assert_eq!(s.new_this_month, 2);
        assert_eq!(
            s.growth.iter().map(|g| g.month.as_str()).collect::<Vec<_>>(),
            vec!["2023-05", "2024-04", "2024-05"]
        );
        assert_eq!(
            s.by_status,
            vec![
                (Status::Prospect, 1),
                (Status::Active, 2),
                (Status::Inactive, 1)
            ]
        );
        assert_eq!(s.by_industry, vec![(Industry::Saas, 3), (Industry::Finance, 1)]);
    }

    #[test]
    fn empty_collection_has_zeroed_status_series() {
        let s = summarize(&[], date("2024-01-01"));
        assert_eq!(s.total, 0);
        assert!(s.growth.is_empty());
        assert_eq!(s.by_status.len(), 3);
        assert!(s.by_status.iter().all(|(_, n)| *n == 0));
    }
}
