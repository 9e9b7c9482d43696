//! The process-wide holder of the active rate tables.
//!
//! Calculations take a [`RateCatalog`] snapshot (one `Arc` clone) and never
//! touch the store again, so a concurrent [`RateTableStore::reload`] is
//! never observed half-applied.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::{RateTableSource, RateTables, ReloadError, Schedule};
use crate::error::LookupError;
use crate::models::{Jurisdiction, TaxKind};

/// Immutable set of rate tables, one per tax year.
#[derive(Debug, Clone, Default)]
pub struct RateCatalog {
    years: BTreeMap<i32, Arc<RateTables>>,
}

impl RateCatalog {
    pub fn tables(
        &self,
        tax_year: i32,
    ) -> Result<&Arc<RateTables>, LookupError> {
        self.years
            .get(&tax_year)
            .ok_or(LookupError::UnknownTaxYear(tax_year))
    }

    pub fn tax_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    pub fn get_schedule(
        &self,
        jurisdiction: &Jurisdiction,
        kind: TaxKind,
        tax_year: i32,
    ) -> Result<Schedule, LookupError> {
        self.tables(tax_year)?.get_schedule(jurisdiction, kind)
    }
}

#[derive(Debug, Default)]
pub struct RateTableStore {
    active: RwLock<Arc<RateCatalog>>,
}

impl RateTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with each of `tables` installed in order.
    pub fn with_tables(tables: impl IntoIterator<Item = RateTables>) -> Self {
        let store = Self::new();
        for table in tables {
            store.install(table);
        }
        store
    }

    /// The catalog in effect right now.
    pub fn snapshot(&self) -> Arc<RateCatalog> {
        // The guarded value is a plain Arc; a panicked writer cannot leave
        // it half-written.
        let guard = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Installs already-validated tables as the next version for their
    /// year and returns that version.
    pub fn install(
        &self,
        tables: RateTables,
    ) -> u32 {
        let tax_year = tables.tax_year();
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);

        let version = guard
            .years
            .get(&tax_year)
            .map_or(1, |current| current.version() + 1);
        let mut next = RateCatalog::clone(&guard);
        next.years
            .insert(tax_year, Arc::new(tables.with_version(version)));
        *guard = Arc::new(next);
        drop(guard);

        info!(tax_year, version, "installed rate tables");
        version
    }

    /// Fetches `tax_year` from `source` and swaps it in.
    ///
    /// The fetch runs before the write lock is taken. On any error the
    /// previous tables stay active.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::Source`] when the source fails or its tables
    /// do not validate, and [`ReloadError::YearMismatch`] when it returns
    /// a different year than requested.
    pub async fn reload(
        &self,
        tax_year: i32,
        source: &dyn RateTableSource,
    ) -> Result<u32, ReloadError> {
        info!(tax_year, source = source.name(), "reloading rate tables");

        let tables = source
            .fetch(tax_year)
            .await
            .map_err(|error| ReloadError::Source {
                source_name: source.name().to_string(),
                error,
            })?;

        if tables.tax_year() != tax_year {
            return Err(ReloadError::YearMismatch {
                requested: tax_year,
                returned: tables.tax_year(),
            });
        }

        Ok(self.install(tables))
    }

    pub fn get_schedule(
        &self,
        jurisdiction: &Jurisdiction,
        kind: TaxKind,
        tax_year: i32,
    ) -> Result<Schedule, LookupError> {
        self.snapshot().get_schedule(jurisdiction, kind, tax_year)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::StateCode;
    use crate::rates::tables::fixtures::{code, sample_builder, sample_tables};
    use crate::rates::{IncomeTaxRegime, RateTableError, SourceError};

    struct FixedSource {
        result: fn() -> Result<RateTables, SourceError>,
    }

    #[async_trait]
    impl RateTableSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(
            &self,
            _tax_year: i32,
        ) -> Result<RateTables, SourceError> {
            (self.result)()
        }
    }

    fn raised_pa_rate() -> Result<RateTables, SourceError> {
        Ok(sample_builder()
            .state(code("PA"), IncomeTaxRegime::Flat { rate: dec!(0.04) })
            .build()?)
    }

    fn invalid_tables() -> Result<RateTables, SourceError> {
        Ok(sample_builder()
            .state(code("PA"), IncomeTaxRegime::Flat { rate: dec!(3.07) })
            .build()?)
    }

    fn pa_rate(catalog: &RateCatalog) -> Schedule {
        catalog
            .get_schedule(&code("PA").into(), TaxKind::State, 2025)
            .unwrap()
    }

    #[test]
    fn install_assigns_increasing_versions() {
        let store = RateTableStore::new();

        assert_eq!(store.install(sample_tables()), 1);
        assert_eq!(store.install(sample_tables()), 2);
        assert_eq!(store.snapshot().tables(2025).unwrap().version(), 2);
    }

    #[test]
    fn unknown_year_is_a_lookup_error() {
        let store = RateTableStore::with_tables([sample_tables()]);

        let result = store.get_schedule(&Jurisdiction::Federal, TaxKind::Federal, 2031);

        assert_eq!(result, Err(LookupError::UnknownTaxYear(2031)));
    }

    #[test]
    fn unknown_state_is_a_lookup_error() {
        let store = RateTableStore::with_tables([sample_tables()]);
        let zz = Jurisdiction::State(StateCode::parse("ZZ").unwrap());

        let result = store.get_schedule(&zz, TaxKind::State, 2025);

        assert_eq!(result, Err(LookupError::UnknownJurisdiction("ZZ".to_string())));
    }

    #[tokio::test]
    async fn reload_swaps_without_disturbing_existing_snapshots() {
        let store = RateTableStore::with_tables([sample_tables()]);
        let before = store.snapshot();

        let version = store
            .reload(2025, &FixedSource { result: raised_pa_rate })
            .await
            .unwrap();

        assert_eq!(version, 2);
        assert_eq!(
            pa_rate(&before),
            Schedule::Income(IncomeTaxRegime::Flat { rate: dec!(0.0307) })
        );
        assert_eq!(
            pa_rate(&store.snapshot()),
            Schedule::Income(IncomeTaxRegime::Flat { rate: dec!(0.04) })
        );
        assert_eq!(before.tables(2025).unwrap().version(), 1);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_tables() {
        let store = RateTableStore::with_tables([sample_tables()]);

        let result = store
            .reload(2025, &FixedSource { result: invalid_tables })
            .await;

        let Err(ReloadError::Source { error, .. }) = result else {
            panic!("expected source error, got {result:?}");
        };
        assert!(matches!(
            error,
            SourceError::Invalid(RateTableError::InvalidRate { .. })
        ));
        assert_eq!(store.snapshot().tables(2025).unwrap().version(), 1);
    }

    #[tokio::test]
    async fn reload_rejects_year_mismatch() {
        let store = RateTableStore::with_tables([sample_tables()]);

        let result = store
            .reload(2026, &FixedSource { result: raised_pa_rate })
            .await;

        assert!(matches!(
            result,
            Err(ReloadError::YearMismatch {
                requested: 2026,
                returned: 2025
            })
        ));
        assert!(store.snapshot().tables(2026).is_err());
    }
}
