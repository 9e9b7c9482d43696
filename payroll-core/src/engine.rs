//! The public calculation facade.
//!
//! A calculation runs in three phases:
//!
//! 1. **Validate** the caller's context against the active rate tables and
//!    reject it before any tax math if anything is malformed.
//! 2. **Resolve** each levy through the bracket, wage-base, jurisdiction and
//!    local resolvers.
//! 3. **Post** every rounded amount to a per-side ledger so that totals are
//!    always the sum of the lines shown.
//!
//! The rate snapshot is taken once per call (once per batch), so a
//! concurrent [`PayrollTaxEngine::reload`] never splits a calculation across
//! two table versions.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::calculations::common::{max, round_half_up, round_rate};
use crate::calculations::{
    BracketResolver, JurisdictionResolver, LocalTaxResolver, WageBaseAccumulator,
    WithholdingAdjustments, aggregate, resolve_frequency,
};
use crate::error::{CalculationError, LookupError, ValidationError};
use crate::models::{
    CalculationResult, EmployeeTaxContext, FilingStatus, Jurisdiction, PayFrequency,
    StateAllocation, StateCode, TaxLine, TaxLineKind, TaxSide, TaxType, reduces_payroll_wages,
};
use crate::rates::{
    JurisdictionRates, RateCatalog, RateTableSource, RateTableStore, RateTables, ReloadError,
};

const FEDERAL_WAGE_BASE_TAXES: [TaxType; 3] =
    [TaxType::SocialSecurity, TaxType::Medicare, TaxType::Futa];
const STATE_WAGE_BASE_TAXES: [TaxType; 3] = [TaxType::Suta, TaxType::Sdi, TaxType::Pfml];

/// Largest accepted money amount or earnings percent. Annualized and
/// apportioned products of inputs up to this bound stay well inside
/// `Decimal`'s range.
pub const MAX_INPUT_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone)]
pub struct PayrollTaxEngine {
    store: Arc<RateTableStore>,
}

impl PayrollTaxEngine {
    pub fn new(store: Arc<RateTableStore>) -> Self {
        Self { store }
    }

    /// An engine over a fresh store holding `tables`.
    pub fn with_tables(tables: impl IntoIterator<Item = RateTables>) -> Self {
        Self::new(Arc::new(RateTableStore::with_tables(tables)))
    }

    pub fn store(&self) -> &Arc<RateTableStore> {
        &self.store
    }

    /// Computes one paycheck.
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError`] if the context fails validation or
    /// refers to a tax year or jurisdiction the active tables do not know.
    pub fn calculate(
        &self,
        context: &EmployeeTaxContext,
    ) -> Result<CalculationResult, CalculationError> {
        calculate_with(&self.store.snapshot(), context)
    }

    /// Same as [`Self::calculate`] but insists on an apportioned context.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingWorkLocations`] when
    /// `work_locations` is absent or empty, otherwise as
    /// [`Self::calculate`].
    pub fn calculate_multistate(
        &self,
        context: &EmployeeTaxContext,
    ) -> Result<CalculationResult, CalculationError> {
        if !context.is_multistate() {
            return Err(ValidationError::MissingWorkLocations.into());
        }
        self.calculate(context)
    }

    /// Computes every context against one rate snapshot, in order. A failed
    /// item occupies its own slot and does not stop the batch.
    pub fn calculate_batch(
        &self,
        contexts: &[EmployeeTaxContext],
    ) -> Vec<Result<CalculationResult, CalculationError>> {
        let catalog = self.store.snapshot();
        contexts
            .iter()
            .map(|context| calculate_with(&catalog, context))
            .collect()
    }

    /// [`Self::calculate_batch`] split across up to `workers` blocking
    /// tasks. Results come back in input order.
    pub async fn calculate_batch_concurrent(
        &self,
        contexts: Vec<EmployeeTaxContext>,
        workers: usize,
    ) -> Vec<Result<CalculationResult, CalculationError>> {
        let total = contexts.len();
        if total == 0 {
            return Vec::new();
        }

        let catalog = self.store.snapshot();
        let chunk_size = total.div_ceil(workers.max(1));
        let mut pending = contexts.into_iter();
        let mut handles = Vec::new();

        loop {
            let chunk: Vec<EmployeeTaxContext> = pending.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();
            let catalog = Arc::clone(&catalog);
            let handle = tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|context| calculate_with(&catalog, context))
                    .collect::<Vec<_>>()
            });
            handles.push((len, handle));
        }
        debug!(items = total, workers = handles.len(), "dispatched batch");

        let mut results = Vec::with_capacity(total);
        for (len, handle) in handles {
            match handle.await {
                Ok(chunk) => results.extend(chunk),
                Err(error) => {
                    warn!(error = %error, items = len, "batch worker failed");
                    let message = error.to_string();
                    results.extend(
                        (0..len).map(|_| Err(CalculationError::WorkerFailed(message.clone()))),
                    );
                }
            }
        }
        results
    }

    /// Every rate `jurisdiction` levies in `tax_year` under the active
    /// tables.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] for an unknown year or jurisdiction.
    pub fn get_tax_rates(
        &self,
        jurisdiction: &Jurisdiction,
        tax_year: i32,
    ) -> Result<JurisdictionRates, LookupError> {
        self.store.snapshot().tables(tax_year)?.describe(jurisdiction)
    }

    /// Refreshes `tax_year` from `source` and returns the new version.
    ///
    /// # Errors
    ///
    /// See [`RateTableStore::reload`].
    pub async fn reload(
        &self,
        tax_year: i32,
        source: &dyn RateTableSource,
    ) -> Result<u32, ReloadError> {
        self.store.reload(tax_year, source).await
    }
}

/// A context that passed validation, with every enum and code parsed.
struct ValidatedContext<'a> {
    tables: &'a RateTables,
    status: FilingStatus,
    frequency: PayFrequency,
    work: StateCode,
    home: StateCode,
    locations: Vec<(StateCode, Decimal)>,
}

fn parse_state(value: &str) -> Result<StateCode, ValidationError> {
    StateCode::parse(value).ok_or_else(|| ValidationError::InvalidStateCode(value.to_string()))
}

fn require_within_limit(
    field: &str,
    value: Decimal,
) -> Result<(), ValidationError> {
    let limit = Decimal::from(MAX_INPUT_AMOUNT);
    if value > limit {
        return Err(ValidationError::AmountOutOfRange {
            field: field.to_string(),
            value,
            limit,
        });
    }
    Ok(())
}

fn require_amount(
    field: &str,
    value: Decimal,
) -> Result<(), ValidationError> {
    if value < Decimal::ZERO {
        return Err(ValidationError::NegativeAmount {
            field: field.to_string(),
            value,
        });
    }
    require_within_limit(field, value)
}

fn validate<'a>(
    catalog: &'a RateCatalog,
    context: &EmployeeTaxContext,
) -> Result<ValidatedContext<'a>, CalculationError> {
    if context.gross_pay < Decimal::ZERO {
        return Err(ValidationError::NegativeGrossPay(context.gross_pay).into());
    }
    require_within_limit("gross_pay", context.gross_pay)?;
    let status = FilingStatus::parse(&context.filing_status)
        .ok_or_else(|| ValidationError::InvalidFilingStatus(context.filing_status.clone()))?;
    let frequency = resolve_frequency(&context.pay_frequency)?;
    let work = parse_state(&context.work_state)?;
    let home = parse_state(&context.home_state)?;

    for (plan, amount) in &context.pre_tax_deductions {
        require_amount(&format!("pre_tax_deductions.{plan}"), *amount)?;
    }
    for (field, amount) in context.ytd.labelled() {
        require_amount(field, amount)?;
    }
    let w4 = &context.w4;
    require_amount("w4.additional_withholding", w4.additional_withholding)?;
    require_amount("w4.other_income", w4.other_income)?;
    require_amount("w4.deductions", w4.deductions)?;
    require_amount("w4.dependents_credit", w4.dependents_credit)?;

    let mut locations = Vec::new();
    for location in context.work_locations.iter().flatten() {
        let state = parse_state(&location.state)?;
        if location.earnings_percent < Decimal::ZERO {
            return Err(ValidationError::NegativeEarningsPercent {
                state: state.to_string(),
                percent: location.earnings_percent,
            }
            .into());
        }
        require_within_limit(
            &format!("work_locations.{state}.earnings_percent"),
            location.earnings_percent,
        )?;
        locations.push((state, location.earnings_percent));
    }

    let tables: &RateTables = catalog.tables(context.tax_year)?;
    let states = [&work, &home]
        .into_iter()
        .chain(locations.iter().map(|(state, _)| state));
    for state in states {
        if !tables.is_known_state(state) {
            return Err(LookupError::UnknownJurisdiction(state.to_string()).into());
        }
    }

    Ok(ValidatedContext {
        tables,
        status,
        frequency,
        work,
        home,
        locations,
    })
}

/// Gross pay split into the wage bases each family of taxes applies to.
struct TaxableWages {
    pre_tax_deductions: Decimal,
    /// Federal, state and local income tax.
    income: Decimal,
    /// FICA, unemployment, disability and leave levies.
    payroll: Decimal,
}

fn taxable_wages(context: &EmployeeTaxContext) -> TaxableWages {
    let gross = context.gross_pay;
    let total: Decimal = context.pre_tax_deductions.values().copied().sum();
    let cafeteria: Decimal = context
        .pre_tax_deductions
        .iter()
        .filter(|(plan, _)| reduces_payroll_wages(plan))
        .map(|(_, amount)| *amount)
        .sum();

    let deductions = if total > gross {
        warn!(
            gross_pay = %gross,
            deductions = %total,
            "pre-tax deductions exceed gross pay; capping at gross"
        );
        gross
    } else {
        total
    };

    TaxableWages {
        pre_tax_deductions: round_half_up(deductions),
        income: round_half_up(max(gross - deductions, Decimal::ZERO)),
        payroll: round_half_up(max(gross - cafeteria.min(gross), Decimal::ZERO)),
    }
}

/// Rounded lines for one side of the paycheck and their running total.
#[derive(Default)]
struct Ledger {
    lines: Vec<TaxLine>,
    total: Decimal,
}

impl Ledger {
    fn post(
        &mut self,
        kind: TaxLineKind,
        jurisdiction: Jurisdiction,
        taxable_wages: Decimal,
        amount: Decimal,
    ) {
        let amount = round_half_up(amount);
        self.total += amount;
        self.lines.push(TaxLine {
            kind,
            jurisdiction,
            taxable_wages,
            amount,
        });
    }
}

fn state_allocations(
    input: &ValidatedContext<'_>,
    taxable: Decimal,
) -> Result<Vec<StateAllocation>, LookupError> {
    let tables = input.tables;
    let state_tax = |state: &StateCode, wages: Decimal| -> Result<Decimal, LookupError> {
        let jurisdiction = Jurisdiction::State(state.clone());
        BracketResolver::new(&jurisdiction, tables.state_regime(state)?).withholding(
            wages,
            input.status,
            input.frequency,
            &WithholdingAdjustments::default(),
        )
    };

    let resolver = JurisdictionResolver::new(tables.reciprocity());
    if input.locations.is_empty() {
        Ok(vec![resolver.single(taxable, &input.work, &input.home, state_tax)?])
    } else {
        resolver.apportion(taxable, &input.locations, &input.home, state_tax)
    }
}

fn calculate_with(
    catalog: &RateCatalog,
    context: &EmployeeTaxContext,
) -> Result<CalculationResult, CalculationError> {
    let input = validate(catalog, context)?;
    let tables = input.tables;
    let wages = taxable_wages(context);
    let mut employee = Ledger::default();
    let mut employer = Ledger::default();

    let federal = BracketResolver::new(&Jurisdiction::Federal, tables.federal()).withholding(
        wages.income,
        input.status,
        input.frequency,
        &WithholdingAdjustments::from(&context.w4),
    )?;
    employee.post(
        TaxLineKind::FederalIncome,
        Jurisdiction::Federal,
        wages.income,
        federal,
    );

    let allocations = state_allocations(&input, wages.income)?;
    for allocation in &allocations {
        employee.post(
            TaxLineKind::StateIncome,
            Jurisdiction::State(allocation.taxed_by.clone()),
            allocation.taxable_wages,
            allocation.tax,
        );
    }

    let accumulator = WageBaseAccumulator::new(tables);
    let levies = FEDERAL_WAGE_BASE_TAXES
        .into_iter()
        .map(|tax_type| (tax_type, Jurisdiction::Federal))
        .chain(
            STATE_WAGE_BASE_TAXES
                .into_iter()
                .map(|tax_type| (tax_type, Jurisdiction::State(input.work.clone()))),
        );
    for (tax_type, jurisdiction) in levies {
        let ytd = context.ytd.wages_for(tax_type);
        for (side, ledger) in [
            (TaxSide::Employee, &mut employee),
            (TaxSide::Employer, &mut employer),
        ] {
            let Some(assessment) =
                accumulator.assess(tax_type, &jurisdiction, side, wages.payroll, ytd)?
            else {
                continue;
            };
            let mut amount = assessment.amount;
            if tax_type == TaxType::Medicare && side == TaxSide::Employee {
                amount += accumulator.additional_medicare(input.status, wages.payroll, ytd);
            }
            ledger.post(
                tax_type.into(),
                jurisdiction.clone(),
                assessment.taxable_wages,
                amount,
            );
        }
    }

    let local = context
        .local_code
        .as_deref()
        .and_then(|code| tables.local(code).map(|tax| (code, tax)));
    if let Some((code, local)) = local {
        let amount = LocalTaxResolver::new(tables).local_tax(
            code,
            context.gross_pay,
            context.is_local_resident.unwrap_or(false),
            input.frequency,
        );
        employee.post(
            TaxLineKind::Local,
            Jurisdiction::Local(local.code.clone()),
            context.gross_pay,
            amount,
        );
    }

    let gross_pay = context.gross_pay;
    let total_employee_tax = employee.total;
    let effective_rate = if gross_pay.is_zero() {
        Decimal::ZERO
    } else {
        round_rate(total_employee_tax / gross_pay)
    };

    let result = CalculationResult {
        calculation_id: Uuid::new_v4(),
        calculated_at: Utc::now(),
        tax_year: tables.tax_year(),
        rate_table_version: tables.version(),
        gross_pay,
        pre_tax_deductions: wages.pre_tax_deductions,
        income_taxable_wages: wages.income,
        payroll_taxable_wages: wages.payroll,
        total_state_tax: aggregate(&allocations),
        state_allocations: allocations,
        total_employee_tax,
        total_employer_tax: employer.total,
        net_pay: gross_pay - wages.pre_tax_deductions - total_employee_tax,
        effective_rate,
        employee_taxes: employee.lines,
        employer_taxes: employer.lines,
    };

    debug!(
        calculation_id = %result.calculation_id,
        gross_pay = %result.gross_pay,
        employee_tax = %result.total_employee_tax,
        employer_tax = %result.total_employer_tax,
        "calculated paycheck"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use tracing_subscriber::fmt::format::FmtSpan;

    use super::*;
    use crate::error::UnsupportedConfiguration;
    use crate::models::WorkLocation;
    use crate::rates::tables::fixtures::{code, sample_builder, sample_tables};
    use crate::rates::{IncomeTaxRegime, SourceError};

    /// Initializes tracing subscriber for tests that verify log output.
    fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_span_events(FmtSpan::NONE)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn engine() -> PayrollTaxEngine {
        PayrollTaxEngine::with_tables([sample_tables()])
    }

    fn context(
        work: &str,
        home: &str,
    ) -> EmployeeTaxContext {
        EmployeeTaxContext::new(
            2025,
            dec!(2000),
            FilingStatus::Single,
            PayFrequency::Biweekly,
            work,
            home,
        )
    }

    struct RaisedPaRate;

    #[async_trait]
    impl RateTableSource for RaisedPaRate {
        fn name(&self) -> &str {
            "raised-pa"
        }

        async fn fetch(
            &self,
            _tax_year: i32,
        ) -> Result<RateTables, SourceError> {
            Ok(sample_builder()
                .state(code("PA"), IncomeTaxRegime::Flat { rate: dec!(0.04) })
                .build()?)
        }
    }

    // =========================================================================
    // single-state paychecks
    // =========================================================================

    #[test]
    fn no_income_tax_state_paycheck() {
        let result = engine().calculate(&context("TX", "TX")).unwrap();

        assert_eq!(result.employee_amount(TaxLineKind::FederalIncome), dec!(161.60));
        assert_eq!(result.employee_amount(TaxLineKind::StateIncome), dec!(0.00));
        assert_eq!(result.employee_amount(TaxLineKind::SocialSecurity), dec!(124.00));
        assert_eq!(result.employee_amount(TaxLineKind::Medicare), dec!(29.00));
        assert_eq!(result.total_employee_tax, dec!(314.60));
        assert_eq!(result.net_pay, dec!(1685.40));
        assert_eq!(result.effective_rate, dec!(0.1573));
    }

    #[test]
    fn employer_side_is_computed_independently() {
        let result = engine().calculate(&context("TX", "TX")).unwrap();

        assert_eq!(result.employer_amount(TaxLineKind::SocialSecurity), dec!(124.00));
        assert_eq!(result.employer_amount(TaxLineKind::Medicare), dec!(29.00));
        assert_eq!(result.employer_amount(TaxLineKind::Futa), dec!(12.00));
        assert_eq!(result.total_employer_tax, dec!(165.00));
        assert!(result.employee_line(TaxLineKind::Futa).is_none());
    }

    #[test]
    fn reciprocity_taxes_in_home_state() {
        let result = engine().calculate(&context("NJ", "PA")).unwrap();

        let allocation = &result.state_allocations[0];
        assert_eq!(allocation.location, code("NJ"));
        assert_eq!(allocation.taxed_by, code("PA"));
        assert!(allocation.reciprocity_applied);
        assert_eq!(allocation.taxable_wages, dec!(2000));
        assert_eq!(result.total_state_tax, dec!(61.40));
        assert_eq!(
            result.employee_line(TaxLineKind::StateIncome).unwrap().jurisdiction,
            Jurisdiction::State(code("PA"))
        );
    }

    #[test]
    fn state_payroll_levies_follow_work_state() {
        let result = engine().calculate(&context("NJ", "PA")).unwrap();

        assert_eq!(result.employee_amount(TaxLineKind::Suta), dec!(8.50));
        assert_eq!(result.employee_amount(TaxLineKind::Sdi), dec!(4.60));
        assert_eq!(result.employer_amount(TaxLineKind::Suta), dec!(56.00));
        assert_eq!(result.employer_amount(TaxLineKind::Sdi), dec!(0));
    }

    #[test]
    fn social_security_stops_at_wage_base() {
        let mut ctx = context("TX", "TX");
        ctx.ytd.gross = dec!(176000);

        let result = engine().calculate(&ctx).unwrap();

        assert_eq!(result.employee_amount(TaxLineKind::SocialSecurity), dec!(6.20));
        assert_eq!(
            result.employee_line(TaxLineKind::SocialSecurity).unwrap().taxable_wages,
            dec!(100)
        );
    }

    #[test]
    fn additional_medicare_is_folded_into_medicare_line() {
        let mut ctx = context("TX", "TX");
        ctx.ytd.medicare = Some(dec!(199000));

        let result = engine().calculate(&ctx).unwrap();

        // 29.00 base + 1000 over threshold × 0.009
        assert_eq!(result.employee_amount(TaxLineKind::Medicare), dec!(38.00));
        assert_eq!(result.employer_amount(TaxLineKind::Medicare), dec!(29.00));
    }

    #[test]
    fn local_tax_is_added_to_employee_side() {
        let mut ctx = context("PA", "NJ");
        ctx.local_code = Some("pa-phl".to_string());

        let result = engine().calculate(&ctx).unwrap();

        let line = result.employee_line(TaxLineKind::Local).unwrap();
        assert_eq!(line.jurisdiction, Jurisdiction::Local("PA-PHL".to_string()));
        assert_eq!(line.amount, dec!(68.80));
    }

    #[test]
    fn unknown_local_code_adds_no_line() {
        let mut ctx = context("TX", "TX");
        ctx.local_code = Some("TX-NOWHERE".to_string());

        let result = engine().calculate(&ctx).unwrap();

        assert!(result.employee_line(TaxLineKind::Local).is_none());
    }

    #[test]
    fn totals_equal_sum_of_rounded_lines() {
        let mut ctx = context("NJ", "PA");
        ctx.gross_pay = dec!(2345.67);
        ctx.local_code = Some("PA-PHL".to_string());

        let result = engine().calculate(&ctx).unwrap();

        let employee: Decimal = result.employee_taxes.iter().map(|l| l.amount).sum();
        let employer: Decimal = result.employer_taxes.iter().map(|l| l.amount).sum();
        assert_eq!(result.total_employee_tax, employee);
        assert_eq!(result.total_employer_tax, employer);
        for line in result.employee_taxes.iter().chain(&result.employer_taxes) {
            assert_eq!(line.amount, round_half_up(line.amount));
        }
        assert_eq!(
            result.net_pay,
            result.gross_pay - result.pre_tax_deductions - result.total_employee_tax
        );
    }

    #[test]
    fn result_carries_table_version_and_year() {
        let result = engine().calculate(&context("TX", "TX")).unwrap();

        assert_eq!(result.tax_year, 2025);
        assert_eq!(result.rate_table_version, 1);
    }

    #[test]
    fn zero_gross_has_zero_effective_rate() {
        let mut ctx = context("TX", "TX");
        ctx.gross_pay = Decimal::ZERO;

        let result = engine().calculate(&ctx).unwrap();

        assert_eq!(result.effective_rate, Decimal::ZERO);
        assert_eq!(result.total_employee_tax, Decimal::ZERO);
    }

    // =========================================================================
    // pre-tax deductions
    // =========================================================================

    #[test]
    fn cafeteria_plans_reduce_payroll_wages_but_retirement_does_not() {
        let mut ctx = context("TX", "TX");
        ctx.pre_tax_deductions = BTreeMap::from([
            ("401k".to_string(), dec!(200)),
            ("section_125".to_string(), dec!(100)),
        ]);

        let result = engine().calculate(&ctx).unwrap();

        assert_eq!(result.pre_tax_deductions, dec!(300));
        assert_eq!(result.income_taxable_wages, dec!(1700));
        assert_eq!(result.payroll_taxable_wages, dec!(1900));
        assert_eq!(result.employee_amount(TaxLineKind::SocialSecurity), dec!(117.80));
        assert_eq!(
            result.net_pay,
            dec!(1700) - result.total_employee_tax
        );
    }

    #[test]
    fn deductions_above_gross_are_capped() {
        let _guard = init_test_tracing();
        let mut ctx = context("TX", "TX");
        ctx.pre_tax_deductions = BTreeMap::from([("401k".to_string(), dec!(3000))]);

        let result = engine().calculate(&ctx).unwrap();

        assert_eq!(result.pre_tax_deductions, dec!(2000));
        assert_eq!(result.income_taxable_wages, dec!(0));
        assert_eq!(result.employee_amount(TaxLineKind::FederalIncome), dec!(0));
        // 401k deferrals are still FICA wages.
        assert_eq!(result.employee_amount(TaxLineKind::SocialSecurity), dec!(124.00));
    }

    // =========================================================================
    // validation
    // =========================================================================

    #[test]
    fn rejects_negative_gross() {
        let mut ctx = context("TX", "TX");
        ctx.gross_pay = dec!(-1);

        assert_eq!(
            engine().calculate(&ctx),
            Err(ValidationError::NegativeGrossPay(dec!(-1)).into())
        );
    }

    #[test]
    fn rejects_unknown_filing_status() {
        let mut ctx = context("TX", "TX");
        ctx.filing_status = "widowed".to_string();

        assert_eq!(
            engine().calculate(&ctx),
            Err(ValidationError::InvalidFilingStatus("widowed".to_string()).into())
        );
    }

    #[test]
    fn rejects_unsupported_frequency() {
        let mut ctx = context("TX", "TX");
        ctx.pay_frequency = "daily".to_string();

        assert_eq!(
            engine().calculate(&ctx),
            Err(UnsupportedConfiguration::UnsupportedFrequency("daily".to_string()).into())
        );
    }

    #[test]
    fn rejects_malformed_state_code() {
        let ctx = context("Texas", "TX");

        assert_eq!(
            engine().calculate(&ctx),
            Err(ValidationError::InvalidStateCode("Texas".to_string()).into())
        );
    }

    #[test]
    fn rejects_state_missing_from_tables() {
        let ctx = context("TX", "ZZ");

        assert_eq!(
            engine().calculate(&ctx),
            Err(LookupError::UnknownJurisdiction("ZZ".to_string()).into())
        );
    }

    #[test]
    fn rejects_unknown_tax_year() {
        let mut ctx = context("TX", "TX");
        ctx.tax_year = 2019;

        assert_eq!(
            engine().calculate(&ctx),
            Err(LookupError::UnknownTaxYear(2019).into())
        );
    }

    #[test]
    fn rejects_negative_ytd() {
        let mut ctx = context("TX", "TX");
        ctx.ytd.sdi = Some(dec!(-5));

        assert_eq!(
            engine().calculate(&ctx),
            Err(ValidationError::NegativeAmount {
                field: "ytd.sdi".to_string(),
                value: dec!(-5),
            }
            .into())
        );
    }

    #[test]
    fn rejects_negative_deduction() {
        let mut ctx = context("TX", "TX");
        ctx.pre_tax_deductions = BTreeMap::from([("hsa".to_string(), dec!(-10))]);

        assert_eq!(
            engine().calculate(&ctx),
            Err(ValidationError::NegativeAmount {
                field: "pre_tax_deductions.hsa".to_string(),
                value: dec!(-10),
            }
            .into())
        );
    }

    #[test]
    fn accepts_gross_at_the_limit() {
        let mut ctx = context("TX", "TX");
        ctx.gross_pay = Decimal::from(MAX_INPUT_AMOUNT);
        ctx.pay_frequency = "weekly".to_string();

        assert!(engine().calculate(&ctx).is_ok());
    }

    #[test]
    fn rejects_oversized_ytd_and_w4_amounts() {
        let huge = Decimal::from(MAX_INPUT_AMOUNT) + dec!(1);
        let mut ytd = context("TX", "TX");
        ytd.ytd.gross = huge;
        let mut w4 = context("TX", "TX");
        w4.w4.other_income = huge;

        for (ctx, field) in [(ytd, "ytd.gross"), (w4, "w4.other_income")] {
            assert_eq!(
                engine().calculate(&ctx),
                Err(ValidationError::AmountOutOfRange {
                    field: field.to_string(),
                    value: huge,
                    limit: Decimal::from(MAX_INPUT_AMOUNT),
                }
                .into())
            );
        }
    }

    // =========================================================================
    // multistate
    // =========================================================================

    fn split_context() -> EmployeeTaxContext {
        let mut ctx = context("VA", "VA");
        ctx.gross_pay = dec!(10000);
        ctx.work_locations = Some(vec![
            WorkLocation {
                state: "VA".to_string(),
                earnings_percent: dec!(60),
            },
            WorkLocation {
                state: "PA".to_string(),
                earnings_percent: dec!(40),
            },
        ]);
        ctx
    }

    #[test]
    fn multistate_taxes_each_slice_in_its_state() {
        let result = engine().calculate_multistate(&split_context()).unwrap();

        let slices: Vec<_> = result
            .state_allocations
            .iter()
            .map(|a| (a.taxed_by.clone(), a.taxable_wages))
            .collect();
        assert_eq!(
            slices,
            vec![(code("VA"), dec!(6000.00)), (code("PA"), dec!(4000.00))]
        );
        // PA: 4000 × 26 × 0.0307 / 26
        assert_eq!(result.state_allocations[1].tax, dec!(122.80));
        assert_eq!(
            result.total_state_tax,
            result.state_allocations.iter().map(|a| a.tax).sum::<Decimal>()
        );
        assert_eq!(result.employee_amount(TaxLineKind::StateIncome), result.total_state_tax);
    }

    #[test]
    fn multistate_requires_locations() {
        assert_eq!(
            engine().calculate_multistate(&context("VA", "VA")),
            Err(ValidationError::MissingWorkLocations.into())
        );
    }

    #[test]
    fn multistate_rejects_negative_percent() {
        let mut ctx = split_context();
        if let Some(locations) = ctx.work_locations.as_mut() {
            locations[1].earnings_percent = dec!(-40);
        }

        assert_eq!(
            engine().calculate_multistate(&ctx),
            Err(ValidationError::NegativeEarningsPercent {
                state: "PA".to_string(),
                percent: dec!(-40),
            }
            .into())
        );
    }

    #[test]
    fn multistate_rejects_unknown_location() {
        let mut ctx = split_context();
        if let Some(locations) = ctx.work_locations.as_mut() {
            locations[1].state = "ZZ".to_string();
        }

        assert_eq!(
            engine().calculate_multistate(&ctx),
            Err(LookupError::UnknownJurisdiction("ZZ".to_string()).into())
        );
    }

    // =========================================================================
    // batches
    // =========================================================================

    #[test]
    fn batch_isolates_failures() {
        let mut bad = context("TX", "TX");
        bad.filing_status = "married".to_string();
        let batch = vec![context("TX", "TX"), bad, context("NJ", "PA")];

        let results = engine().calculate_batch(&batch);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(ValidationError::InvalidFilingStatus("married".to_string()).into())
        );
        assert_eq!(results[2].as_ref().unwrap().total_state_tax, dec!(61.40));
    }

    fn oversized() -> EmployeeTaxContext {
        let mut ctx = context("TX", "TX");
        ctx.gross_pay = Decimal::MAX / dec!(10);
        ctx
    }

    #[test]
    fn batch_survives_oversized_gross() {
        let batch = vec![context("TX", "TX"), oversized(), context("NJ", "PA")];

        let results = engine().calculate_batch(&batch);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(ValidationError::AmountOutOfRange {
                field: "gross_pay".to_string(),
                value: Decimal::MAX / dec!(10),
                limit: Decimal::from(MAX_INPUT_AMOUNT),
            }
            .into())
        );
        assert_eq!(results[2].as_ref().unwrap().total_state_tax, dec!(61.40));
    }

    #[tokio::test]
    async fn concurrent_batch_survives_oversized_gross() {
        let batch = vec![context("TX", "TX"), oversized(), context("TX", "TX")];

        let results = engine().calculate_batch_concurrent(batch, 1).await;

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(CalculationError::Validation(ValidationError::AmountOutOfRange { .. }))
        ));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn concurrent_batch_preserves_input_order() {
        let engine = engine();
        let batch: Vec<_> = (1..=7)
            .map(|i| {
                let mut ctx = context("TX", "TX");
                ctx.gross_pay = Decimal::from(i * 500);
                if i == 4 {
                    ctx.pay_frequency = "hourly".to_string();
                }
                ctx
            })
            .collect();

        let sequential = engine.calculate_batch(&batch);
        let concurrent = engine.calculate_batch_concurrent(batch, 3).await;

        assert_eq!(concurrent.len(), 7);
        for (seq, conc) in sequential.iter().zip(&concurrent) {
            match (seq, conc) {
                (Ok(a), Ok(b)) => {
                    assert_eq!(a.gross_pay, b.gross_pay);
                    assert_eq!(a.total_employee_tax, b.total_employee_tax);
                }
                (Err(a), Err(b)) => assert_eq!(a, b),
                _ => panic!("sequential and concurrent results disagree"),
            }
        }
        assert!(concurrent[3].is_err());
    }

    #[tokio::test]
    async fn concurrent_batch_of_nothing_is_empty() {
        let results = engine().calculate_batch_concurrent(Vec::new(), 4).await;

        assert!(results.is_empty());
    }

    // =========================================================================
    // rates and reload
    // =========================================================================

    #[test]
    fn get_tax_rates_reports_active_version() {
        let rates = engine()
            .get_tax_rates(&Jurisdiction::parse("PA"), 2025)
            .unwrap();

        assert_eq!(rates.version, 1);
        assert_eq!(rates.income_tax, Some(IncomeTaxRegime::Flat { rate: dec!(0.0307) }));
    }

    #[test]
    fn get_tax_rates_unknown_year() {
        assert_eq!(
            engine().get_tax_rates(&Jurisdiction::Federal, 2030),
            Err(LookupError::UnknownTaxYear(2030))
        );
    }

    #[tokio::test]
    async fn reload_applies_to_later_calculations_only() {
        let engine = engine();
        let ctx = context("PA", "PA");
        let before = engine.calculate(&ctx).unwrap();

        let version = engine.reload(2025, &RaisedPaRate).await.unwrap();
        let after = engine.calculate(&ctx).unwrap();

        assert_eq!(version, 2);
        assert_eq!(before.total_state_tax, dec!(61.40));
        assert_eq!(before.rate_table_version, 1);
        assert_eq!(after.total_state_tax, dec!(80.00));
        assert_eq!(after.rate_table_version, 2);
    }
}
