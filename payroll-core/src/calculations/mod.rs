//! Resolvers that turn rate tables and wages into per-period tax amounts.
//!
//! Each resolver borrows the rate data it needs and is pure; the
//! [`crate::engine`] composes them into a full paycheck.

pub mod brackets;
pub mod common;
pub mod jurisdiction;
pub mod local;
pub mod wage_base;

pub use brackets::{
    BracketResolver, WithholdingAdjustments, annualize, deannualize, periodic_tax,
    resolve_frequency,
};
pub use jurisdiction::{JurisdictionResolver, StateRouting, aggregate};
pub use local::LocalTaxResolver;
pub use wage_base::{WageBaseAccumulator, WageBaseAssessment, taxable_wages};
