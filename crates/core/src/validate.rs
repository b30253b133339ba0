use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{PHONE_DIGITS, Record};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

const NAME_MIN_CHARS: usize = 2;

/// Record field names, spelled the way they appear on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    Name,
    Email,
    Phone,
    CreatedAt,
    Status,
    Industry,
    MonthlySpend,
    LifetimeValue,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::CreatedAt => "createdAt",
            Self::Status => "status",
            Self::Industry => "industry",
            Self::MonthlySpend => "monthlySpend",
            Self::LifetimeValue => "lifetimeValue",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule a field broke.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    MinLength,
    Format,
    Length,
    NonNegative,
}

/// One per-field validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: Field,
    pub rule: Rule,
    pub message: String,
}

impl FieldError {
    fn new(field: Field, rule: Rule, message: &str) -> Self {
        Self {
            field,
            rule,
            message: message.to_string(),
        }
    }
}

/// A unique field of `candidate` already belongs to another record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{field} is already registered")]
#[serde(rename_all = "camelCase")]
pub struct DuplicateField {
    pub field: Field,
    pub conflicting_id: String,
}

/// Validate a record by composing independent field validators.
/// Every failing field is reported, not only the first.
pub fn validate_record(record: &Record) -> Result<(), Vec<FieldError>> {
    let validators: &[fn(&Record) -> Option<FieldError>] = &[
        validate_name,
        validate_email,
        validate_phone,
        validate_monthly_spend,
        validate_lifetime_value,
    ];

    let errors: Vec<FieldError> = validators.iter().filter_map(|v| v(record)).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_name(record: &Record) -> Option<FieldError> {
    let name = record.name.trim();
    if name.is_empty() {
        Some(FieldError::new(Field::Name, Rule::Required, "Name is required"))
    } else if name.chars().count() < NAME_MIN_CHARS {
        Some(FieldError::new(
            Field::Name,
            Rule::MinLength,
            "Name must be at least 2 characters",
        ))
    } else {
        None
    }
}

fn validate_email(record: &Record) -> Option<FieldError> {
    let email = record.email.trim();
    if email.is_empty() {
        Some(FieldError::new(Field::Email, Rule::Required, "E-mail is required"))
    } else if !EMAIL_RE.is_match(email) {
        Some(FieldError::new(
            Field::Email,
            Rule::Format,
            "Invalid e-mail address",
        ))
    } else {
        None
    }
}

fn validate_phone(record: &Record) -> Option<FieldError> {
    if record.phone.is_empty() {
        Some(FieldError::new(
            Field::Phone,
            Rule::Required,
            "Phone number is required",
        ))
    } else if record.phone.len() != PHONE_DIGITS
        || !record.phone.bytes().all(|b| b.is_ascii_digit())
    {
        Some(FieldError::new(
            Field::Phone,
            Rule::Length,
            "Must be exactly 10 digits",
        ))
    } else {
        None
    }
}

fn validate_monthly_spend(record: &Record) -> Option<FieldError> {
    non_negative(Field::MonthlySpend, record.monthly_spend)
}

fn validate_lifetime_value(record: &Record) -> Option<FieldError> {
    non_negative(Field::LifetimeValue, record.lifetime_value)
}

fn non_negative(field: Field, value: f64) -> Option<FieldError> {
    if value.is_finite() && value >= 0.0 {
        None
    } else {
        Some(FieldError::new(
            field,
            Rule::NonNegative,
            "Must be a non-negative number",
        ))
    }
}

/// Find the first record, other than `candidate` itself, that already uses
/// the candidate's email or phone. Email collisions are reported first.
pub fn find_duplicate<'a>(
    existing: impl IntoIterator<Item = &'a Record>,
    candidate: &Record,
) -> Option<DuplicateField> {
    let email = candidate.email.trim();
    let mut phone_hit = None;

    for other in existing {
        if other.id == candidate.id {
            continue;
        }
        if other.email.trim().eq_ignore_ascii_case(email) {
            return Some(DuplicateField {
                field: Field::Email,
                conflicting_id: other.id.clone(),
            });
        }
        if phone_hit.is_none() && other.phone == candidate.phone {
            phone_hit = Some(DuplicateField {
                field: Field::Phone,
                conflicting_id: other.id.clone(),
            });
        }
    }

    phone_hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn valid_record_passes() {
        let r = testing::record("c1", "Geneva Swift", "geneva@mail.com", "5550000001");
        assert!(validate_record(&r).is_ok());
    }

    #[test]
    fn empty_form_reports_every_required_field() {
        let mut r = testing::record("c1", "", "", "");
        r.monthly_spend = -1.0;

        let errors = validate_record(&r).unwrap_err();
        let fields: Vec<Field> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![Field::Name, Field::Email, Field::Phone, Field::MonthlySpend]
        );
        assert_eq!(errors[0].message, "Name is required");
        assert_eq!(errors[1].message, "E-mail is required");
    }

    #[test]
    fn format_rules_apply_after_required() {
        let r = testing::record("c1", "A", "not-an-email", "12345");
        let errors = validate_record(&r).unwrap_err();
        assert_eq!(errors[0].rule, Rule::MinLength);
        assert_eq!(errors[1].rule, Rule::Format);
        assert_eq!(errors[2].rule, Rule::Length);
    }

    #[test]
    fn phone_rejects_non_digits() {
        let r = testing::record("c1", "Foo Bar", "foo@bar.com", "55500000a1");
        let errors = validate_record(&r).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, Field::Phone);
    }

    #[test]
    fn nan_spend_is_rejected() {
        let mut r = testing::record("c1", "Foo Bar", "foo@bar.com", "5550000001");
        r.lifetime_value = f64::NAN;
        let errors = validate_record(&r).unwrap_err();
        assert_eq!(errors[0].field, Field::LifetimeValue);
    }

    #[test]
    fn duplicate_email_is_found_case_insensitively() {
        let existing = vec![testing::record(
            "c1",
            "Geneva Swift",
            "geneva.swift@mail.com",
            "5550000001",
        )];
        let candidate = testing::record("", "Foo Bar", "Geneva.Swift@mail.com", "1234567890");

        let dup = find_duplicate(&existing, &candidate).unwrap();
        assert_eq!(dup.field, Field::Email);
        assert_eq!(dup.conflicting_id, "c1");
    }

    #[test]
    fn email_collision_wins_over_earlier_phone_collision() {
        let existing = vec![
            testing::record("c1", "One", "one@mail.com", "1234567890"),
            testing::record("c2", "Two", "foo@mail.com", "5550000002"),
        ];
        let candidate = testing::record("", "Foo", "foo@mail.com", "1234567890");

        let dup = find_duplicate(&existing, &candidate).unwrap();
        assert_eq!(dup.field, Field::Email);
        assert_eq!(dup.conflicting_id, "c2");
    }

    #[test]
    fn editing_a_record_does_not_collide_with_itself() {
        let existing = vec![testing::record("c1", "Foo", "foo@mail.com", "1234567890")];
        let mut edited = existing[0].clone();
        edited.name = "Foo Baz".into();

        assert!(find_duplicate(&existing, &edited).is_none());
    }
}
