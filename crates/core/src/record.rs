//! The managed business entity: a client record.
//!
//! Records are owned by the server-side collection. Clients only ever hold
//! cached copies of pages, never authoritative state.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Exact number of digits in a stored phone number.
pub const PHONE_DIGITS: usize = 10;

/// Lifecycle status of a client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Prospect,
    Active,
    Inactive,
}

impl Status {
    pub const ALL: [Status; 3] = [Self::Prospect, Self::Active, Self::Inactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospect => "prospect",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Closed set of industries a client can belong to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Industry {
    #[serde(rename = "SaaS")]
    Saas,
    Finance,
    Retail,
    Healthcare,
}

impl Industry {
    pub const ALL: [Industry; 4] = [Self::Saas, Self::Finance, Self::Retail, Self::Healthcare];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saas => "SaaS",
            Self::Finance => "Finance",
            Self::Retail => "Retail",
            Self::Healthcare => "Healthcare",
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// A single client record.
///
/// Text fields default to empty so that a half-filled form still reaches
/// [`crate::validate::validate_record`] and reports every missing field at
/// once instead of failing on the first absent key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Digits only. Accepted on the wire as a JSON string or integer.
    #[serde(default, deserialize_with = "phone_format::deserialize")]
    pub phone: String,
    #[serde(default = "today")]
    pub created_at: NaiveDate,
    #[serde(default)]
    pub status: Status,
    pub industry: Industry,
    #[serde(default)]
    pub monthly_spend: f64,
    #[serde(default)]
    pub lifetime_value: f64,
}

impl Record {
    /// Every field rendered the way the search filter sees it.
    pub fn searchable_fields(&self) -> [String; 9] {
        [
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.phone.clone(),
            self.created_at.format("%Y-%m-%d").to_string(),
            self.status.as_str().to_string(),
            self.industry.as_str().to_string(),
            self.monthly_spend.to_string(),
            self.lifetime_value.to_string(),
        ]
    }
}

/// Today's date in UTC, the default `createdAt` for new records.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

mod phone_format {
    use std::fmt;

    use serde::de::{self, Deserializer, Visitor};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(PhoneVisitor)
    }

    struct PhoneVisitor;

    impl Visitor<'_> for PhoneVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a phone number as a string or an integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.trim().to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(format!("{v:.0}"))
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }
}
