//! Flat CSV rendering of batch results, one row per input context.

use std::fmt::Display;
use std::io::Write;

use payroll_core::{CalculationResult, TaxLineKind};
use rust_decimal::Decimal;
use serde::Serialize;

/// One output row. A failed row (unreadable input or a rejected
/// calculation) keeps its `row` number and carries the error text, with
/// every amount left empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultRow {
    pub row: usize,
    pub calculation_id: Option<String>,
    pub tax_year: Option<i32>,
    pub rate_table_version: Option<u32>,
    pub gross_pay: Option<Decimal>,
    pub federal_income: Option<Decimal>,
    pub state_income: Option<Decimal>,
    pub local: Option<Decimal>,
    pub social_security: Option<Decimal>,
    pub medicare: Option<Decimal>,
    pub employee_suta: Option<Decimal>,
    pub sdi: Option<Decimal>,
    pub pfml: Option<Decimal>,
    pub total_employee_tax: Option<Decimal>,
    pub total_employer_tax: Option<Decimal>,
    pub net_pay: Option<Decimal>,
    pub effective_rate: Option<Decimal>,
    pub error: Option<String>,
}

impl ResultRow {
    pub fn from_outcome<E: Display>(
        row: usize,
        outcome: &Result<CalculationResult, E>,
    ) -> Self {
        match outcome {
            Ok(result) => Self {
                row,
                calculation_id: Some(result.calculation_id.to_string()),
                tax_year: Some(result.tax_year),
                rate_table_version: Some(result.rate_table_version),
                gross_pay: Some(result.gross_pay),
                federal_income: Some(result.employee_amount(TaxLineKind::FederalIncome)),
                state_income: Some(result.employee_amount(TaxLineKind::StateIncome)),
                local: Some(result.employee_amount(TaxLineKind::Local)),
                social_security: Some(result.employee_amount(TaxLineKind::SocialSecurity)),
                medicare: Some(result.employee_amount(TaxLineKind::Medicare)),
                employee_suta: Some(result.employee_amount(TaxLineKind::Suta)),
                sdi: Some(result.employee_amount(TaxLineKind::Sdi)),
                pfml: Some(result.employee_amount(TaxLineKind::Pfml)),
                total_employee_tax: Some(result.total_employee_tax),
                total_employer_tax: Some(result.total_employer_tax),
                net_pay: Some(result.net_pay),
                effective_rate: Some(result.effective_rate),
                error: None,
            },
            Err(err) => Self {
                row,
                error: Some(err.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Writes one row per outcome, numbered from 1 in input order.
pub fn write_results<W: Write, E: Display>(
    writer: W,
    outcomes: &[Result<CalculationResult, E>],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (idx, outcome) in outcomes.iter().enumerate() {
        csv_writer.serialize(ResultRow::from_outcome(idx + 1, outcome))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use payroll_core::{CalculationError, LookupError, ValidationError};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn error_rows_leave_amounts_empty() {
        let outcomes: Vec<Result<CalculationResult, CalculationError>> = vec![
            Err(ValidationError::InvalidFilingStatus("married".to_string()).into()),
            Err(LookupError::UnknownTaxYear(1999).into()),
        ];
        let mut buffer = Vec::new();

        write_results(&mut buffer, &outcomes).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("row,calculation_id,tax_year"));
        assert!(lines[0].ends_with(",error"));
        assert!(lines[1].starts_with("1,,,"), "{}", lines[1]);
        assert!(lines[2].starts_with("2,,,"), "{}", lines[2]);
        assert!(lines[2].contains("1999"), "{}", lines[2]);
    }

    #[test]
    fn any_displayable_error_fills_error_column() {
        let outcomes: Vec<Result<CalculationResult, String>> =
            vec![Err("row 2: invalid gross_pay".to_string())];
        let mut buffer = Vec::new();

        write_results(&mut buffer, &outcomes).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().nth(1).is_some_and(|line| line.ends_with(",row 2: invalid gross_pay")), "{text}");
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let mut buffer = Vec::new();

        write_results::<_, CalculationError>(&mut buffer, &[]).unwrap();

        assert!(buffer.is_empty());
    }
}
