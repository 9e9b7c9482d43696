mod calculation_result;
mod employee_context;
mod filing_status;
mod jurisdiction;
mod pay_frequency;
mod tax_bracket;
mod tax_type;

pub use calculation_result::{CalculationResult, StateAllocation, TaxLine, TaxLineKind};
pub use employee_context::{
    EmployeeTaxContext, W4Elections, WorkLocation, YtdSnapshot, reduces_payroll_wages,
};
pub use filing_status::FilingStatus;
pub use jurisdiction::{Jurisdiction, StateCode};
pub use pay_frequency::PayFrequency;
pub use tax_bracket::TaxBracket;
pub use tax_type::{TaxKind, TaxSide, TaxType};
