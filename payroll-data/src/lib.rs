//! CSV rate tables, the bundled tax years, and employee-context I/O for the
//! payroll tax engine.

pub mod builtin;
pub mod context;
pub mod loader;
pub mod results;
pub mod source;

pub use builtin::{BUNDLED_YEARS, bundled_engine, bundled_store, bundled_tables};
pub use context::{
    ContextLoadError, LoadedRow, load_from_file, load_from_str, parse_work_locations,
};
pub use loader::{RateTableFiles, RateTableLoader, RateTableLoaderError};
pub use results::{ResultRow, write_results};
pub use source::{BundledRateSource, CsvRateSource};
