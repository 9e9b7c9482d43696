use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BracketSchedule;

/// The kind of authority levying a local tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevyKind {
    City,
    County,
    School,
    Transit,
}

impl LevyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::County => "county",
            Self::School => "school",
            Self::Transit => "transit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "city" => Some(Self::City),
            "county" => Some(Self::County),
            "school" => Some(Self::School),
            "transit" => Some(Self::Transit),
            _ => None,
        }
    }
}

/// The four local tax formula shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum LocalFormula {
    /// One rate on gross pay.
    Flat { rate: Decimal },
    /// Separate rates for residents and nonresidents.
    Differential {
        resident_rate: Decimal,
        nonresident_rate: Decimal,
    },
    /// Annualized bracket schedule; nonresidents owe nothing when
    /// `resident_only` is set.
    Progressive {
        schedule: BracketSchedule,
        resident_only: bool,
    },
    /// Fixed amount per month, prorated to the pay period.
    Periodic { monthly_amount: Decimal },
}

impl LocalFormula {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flat { .. } => "flat",
            Self::Differential { .. } => "differential",
            Self::Progressive { .. } => "progressive",
            Self::Periodic { .. } => "periodic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTax {
    pub code: String,
    pub levy: LevyKind,
    pub formula: LocalFormula,
}
