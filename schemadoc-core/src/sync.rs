//! Synchronization orchestrator.
//!
//! A pass walks the object classes in a fixed order (tables, views,
//! functions, procedures, triggers). Each class is listed with one bulk
//! query and every extracted object is reconciled on its own, so a failure
//! is contained to the object or class it happened in. Only losing a
//! connection stops the pass.

use crate::adapters::{ConnectionHandle, DialectAdapter};
use crate::config::SyncConfig;
use crate::error::{Result, SchemaDocError};
use crate::models::{Dialect, ObjectClass, SchemaObject};
use crate::reconcile::Reconciler;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// A single object that could not be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFailure {
    /// Natural key of the object
    pub name: String,
    /// Sanitized error message
    pub message: String,
}

/// Outcome of one object class within a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassReport {
    /// Records returned by the adapter
    pub extracted: usize,
    /// Records written successfully
    pub reconciled: usize,
    /// Records whose transaction was rolled back
    pub failed: usize,
    /// Records dropped because an earlier record had the same name
    pub skipped: usize,
    /// Names that occurred more than once, once per dropped record
    pub skipped_names: Vec<String>,
    /// Set when the class could not be listed at all
    pub extraction_error: Option<String>,
    /// Per-object failure details
    pub failures: Vec<ObjectFailure>,
}

impl ClassReport {
    /// Whether the class was listed and every record reconciled.
    ///
    /// Records dropped as duplicates were never written, so they make the
    /// class incomplete.
    pub fn is_complete(&self) -> bool {
        self.extraction_error.is_none() && self.failed == 0 && self.skipped == 0
    }
}

/// Summary of one synchronization pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Correlates log lines of this pass
    pub run_id: Uuid,
    /// Repository database that was synchronized
    pub database_id: i64,
    /// Source dialect
    pub dialect: Dialect,
    /// Wall-clock start of the pass
    pub started_at: DateTime<Utc>,
    /// Duration of the pass in milliseconds
    pub elapsed_ms: u64,
    /// Per-class outcome, in synchronization order
    pub classes: BTreeMap<ObjectClass, ClassReport>,
}

impl SyncReport {
    /// Whether every class was listed and every object reconciled.
    pub fn is_complete(&self) -> bool {
        self.classes.len() == ObjectClass::ALL.len()
            && self.classes.values().all(ClassReport::is_complete)
    }

    /// Objects that failed to reconcile, across all classes.
    pub fn total_failed(&self) -> usize {
        self.classes.values().map(|class| class.failed).sum()
    }

    /// Objects dropped as duplicate names, across all classes.
    pub fn total_skipped(&self) -> usize {
        self.classes.values().map(|class| class.skipped).sum()
    }

    /// Objects written successfully, across all classes.
    pub fn total_reconciled(&self) -> usize {
        self.classes.values().map(|class| class.reconciled).sum()
    }

    /// Outcome of one class, if the pass reached it.
    pub fn class(&self, object_class: ObjectClass) -> Option<&ClassReport> {
        self.classes.get(&object_class)
    }
}

/// Drives synchronization passes into one repository.
///
/// # Example
/// ```rust,no_run
/// use schemadoc_core::{SyncConfig, Synchronizer, store::Store};
///
/// # async fn run(handle: schemadoc_core::ConnectionHandle) -> schemadoc_core::Result<()> {
/// let store = Store::connect("sqlite://schemadoc.db").await?;
/// let database_id = store.create_database(1, "shop", None).await?;
/// let report = Synchronizer::new(store, SyncConfig::default())
///     .synchronize_and_release(handle, database_id)
///     .await?;
/// println!("{} objects written", report.total_reconciled());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Synchronizer {
    reconciler: Reconciler,
}

impl Synchronizer {
    pub fn new(store: Store, config: SyncConfig) -> Self {
        Self {
            reconciler: Reconciler::new(store, config),
        }
    }

    pub fn store(&self) -> &Store {
        self.reconciler.store()
    }

    pub fn config(&self) -> &SyncConfig {
        self.reconciler.config()
    }

    /// Runs one full pass from `source` into repository database
    /// `database_id`.
    ///
    /// Concurrent passes on the same database id must be serialized by the
    /// caller.
    ///
    /// # Errors
    /// Returns error if:
    /// - The pass configuration is invalid
    /// - `database_id` does not exist in the repository
    /// - The source or repository connection is lost
    ///
    /// Extraction, timeout and per-object failures are recorded in the
    /// returned report instead.
    pub async fn synchronize<A>(&self, source: &A, database_id: i64) -> Result<SyncReport>
    where
        A: DialectAdapter + ?Sized,
    {
        self.config().validate()?;
        if self.store().database(database_id).await?.is_none() {
            return Err(SchemaDocError::configuration(format!(
                "database {database_id} does not exist in the documentation repository"
            )));
        }

        let run_id = Uuid::new_v4();
        let dialect = source.dialect();
        let span = tracing::info_span!("sync", %run_id, database_id, %dialect);
        self.run(source, database_id, run_id)
            .instrument(span)
            .await
    }

    /// Runs one pass and releases the handle afterwards, whatever the outcome.
    ///
    /// # Errors
    /// Same as [`Self::synchronize`]
    pub async fn synchronize_and_release(
        &self,
        handle: ConnectionHandle,
        database_id: i64,
    ) -> Result<SyncReport> {
        let result = self.synchronize(&handle, database_id).await;
        handle.release().await;
        result
    }

    async fn run<A>(&self, source: &A, database_id: i64, run_id: Uuid) -> Result<SyncReport>
    where
        A: DialectAdapter + ?Sized,
    {
        let start_time = Instant::now();
        let mut report = SyncReport {
            run_id,
            database_id,
            dialect: source.dialect(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            classes: BTreeMap::new(),
        };

        tracing::info!("Starting synchronization pass");

        for object_class in ObjectClass::ALL {
            let class_report = self.sync_class(source, database_id, object_class).await?;
            report.classes.insert(object_class, class_report);
        }

        report.elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            elapsed_ms = report.elapsed_ms,
            reconciled = report.total_reconciled(),
            failed = report.total_failed(),
            complete = report.is_complete(),
            "Synchronization pass finished"
        );
        Ok(report)
    }

    async fn sync_class<A>(
        &self,
        source: &A,
        database_id: i64,
        object_class: ObjectClass,
    ) -> Result<ClassReport>
    where
        A: DialectAdapter + ?Sized,
    {
        let mut report = ClassReport::default();

        let objects = match self.extract(source, object_class).await {
            Ok(objects) => objects,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(%object_class, error = %e, "Extraction failed, skipping class");
                report.extraction_error = Some(e.to_string());
                return Ok(report);
            }
        };
        report.extracted = objects.len();

        let mut seen = HashSet::with_capacity(objects.len());
        for object in &objects {
            let name = object.name();
            if !seen.insert(name) {
                tracing::warn!(
                    %object_class,
                    object = name,
                    "Duplicate name in source catalog, keeping first"
                );
                report.skipped += 1;
                report.skipped_names.push(name.to_string());
                continue;
            }

            match self.reconciler.reconcile(database_id, object).await {
                Ok(result) => {
                    report.reconciled += 1;
                    tracing::debug!(
                        %object_class,
                        object = name,
                        description_id = result.description_id,
                        created = result.created,
                        children = result.children,
                        "Reconciled object"
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        %object_class,
                        object = name,
                        error = %e,
                        "Failed to reconcile object"
                    );
                    report.failed += 1;
                    report.failures.push(ObjectFailure {
                        name: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %object_class,
            extracted = report.extracted,
            reconciled = report.reconciled,
            failed = report.failed,
            skipped = report.skipped,
            "Synchronized object class"
        );
        Ok(report)
    }

    /// Lists one class, bounded by the pass query timeout.
    async fn extract<A>(&self, source: &A, object_class: ObjectClass) -> Result<Vec<SchemaObject>>
    where
        A: DialectAdapter + ?Sized,
    {
        let timeout = self.config().query_timeout;
        tokio::time::timeout(timeout, list_class(source, object_class))
            .await
            .map_err(|_| SchemaDocError::Timeout {
                object_class,
                timeout,
            })?
    }
}

async fn list_class<A>(source: &A, object_class: ObjectClass) -> Result<Vec<SchemaObject>>
where
    A: DialectAdapter + ?Sized,
{
    let objects = match object_class {
        ObjectClass::Tables => wrap(source.list_tables().await?, SchemaObject::Table),
        ObjectClass::Views => wrap(source.list_views().await?, SchemaObject::View),
        ObjectClass::Functions => wrap(source.list_functions().await?, SchemaObject::Function),
        ObjectClass::Procedures => wrap(source.list_procedures().await?, SchemaObject::Procedure),
        ObjectClass::Triggers => wrap(source.list_triggers().await?, SchemaObject::Trigger),
    };
    Ok(objects)
}

fn wrap<T>(records: Vec<T>, variant: fn(T) -> SchemaObject) -> Vec<SchemaObject> {
    records.into_iter().map(variant).collect()
}
