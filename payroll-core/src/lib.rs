pub mod calculations;
pub mod engine;
pub mod error;
pub mod models;
pub mod rates;

pub use engine::{MAX_INPUT_AMOUNT, PayrollTaxEngine};
pub use error::{CalculationError, LookupError, UnsupportedConfiguration, ValidationError};
pub use models::*;
