use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of a progressive rate schedule.
///
/// `base_tax` is the cumulative tax owed on all income below `min_income`.
/// A `max_income` of `None` marks the open-ended top bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min_income: Decimal,
    pub max_income: Option<Decimal>,
    pub tax_rate: Decimal,
    pub base_tax: Decimal,
}
