use chrono::NaiveDate;

use crate::{Industry, Record, Status};

/// Valid record with the given identity fields (SaaS prospect, created 2024-01-15).
pub fn record(id: &str, name: &str, email: &str, phone: &str) -> Record {
    Record {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        created_at: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
        status: Status::Prospect,
        industry: Industry::Saas,
        monthly_spend: 250.0,
        lifetime_value: 3000.0,
    }
}

/// `count` valid records named `{prefix}0..{prefix}{count-1}` with unique
/// ids, emails and phones.
pub fn named_records(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            record(
                &format!("{}-{i:04}", prefix.to_lowercase()),
                &format!("{prefix}{i}"),
                &format!("{}{i}@mail.test", prefix.to_lowercase()),
                &format!("{:010}", 5_550_000_000u64 + i as u64),
            )
        })
        .collect()
}
