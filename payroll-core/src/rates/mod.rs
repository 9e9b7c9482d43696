//! Versioned fiscal constants and the store that serves them.

mod local;
mod reciprocity;
mod regime;
mod report;
mod schedule;
mod source;
mod store;
pub(crate) mod tables;

pub use local::{LevyKind, LocalFormula, LocalTax};
pub use reciprocity::ReciprocityGraph;
pub use regime::{AdditionalMedicare, IncomeTaxRegime, ProgressiveRegime, WageBaseLimit};
pub use report::JurisdictionRates;
pub use schedule::{BracketSchedule, ScheduleError};
pub use source::{RateTableSource, ReloadError, SourceError};
pub use store::{RateCatalog, RateTableStore};
pub use tables::{RateTableError, RateTables, RateTablesBuilder, Schedule};
