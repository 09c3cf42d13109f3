use crate::error::BackupError;
use crate::export::{render_artifact, ExportArtifact};
use crate::filter::{build_predicate, BackupFilter};
use crate::model::{Bundle, RawBundle, SchoolSummary, Term};
use crate::reconcile::{reconcile, AssessmentScorer, ComponentScorer, StudentSnapshot};
use crate::store::BackupRepository;
use crate::taxonomy::{ClassCatalog, Level};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRow {
    pub id: String,
    pub school_id: String,
    pub school_name: Option<String>,
    pub term: Term,
    pub academic_year: String,
    pub timestamp: i64,
    pub captured_at: Option<String>,
    pub has_data: bool,
}

impl BundleRow {
    fn new(bundle: &Bundle, schools: &[SchoolSummary]) -> Self {
        BundleRow {
            id: bundle.id.clone(),
            school_id: bundle.school_id.clone(),
            school_name: school_name(schools, &bundle.school_id),
            term: bundle.term,
            academic_year: bundle.academic_year.clone(),
            timestamp: bundle.timestamp,
            captured_at: DateTime::<Utc>::from_timestamp_millis(bundle.timestamp)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            has_data: bundle.data.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    #[serde(flatten)]
    pub snapshot: StudentSnapshot,
    pub class_name: String,
    pub level: Level,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionCount {
    pub name: &'static str,
    pub count: usize,
}

/// The one open detail record. Recomputed every time it is opened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDetail {
    #[serde(skip)]
    pub bundle: Bundle,
    pub header: BundleRow,
    pub students: Vec<SnapshotRow>,
    pub collections: Vec<CollectionCount>,
    pub school_settings: Option<Value>,
}

/// Display state of one dashboard session.
///
/// Never mutated in place: each operation outcome produces the next state
/// through [`DashboardState::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub bundles: Vec<Bundle>,
    pub filter: BackupFilter,
    pub schools: Vec<SchoolSummary>,
    pub detail: Option<OpenDetail>,
    pub pending_delete: Option<String>,
    pub list_generation: u64,
    pub detail_generation: u64,
}

#[derive(Debug, Clone)]
pub enum Transition {
    ListLoaded {
        generation: u64,
        filter: BackupFilter,
        bundles: Vec<Bundle>,
    },
    SchoolsLoaded(Vec<SchoolSummary>),
    DetailLoaded {
        generation: u64,
        detail: Box<OpenDetail>,
    },
    DetailClosed {
        generation: u64,
    },
    DeleteRequested(String),
    DeleteCancelled,
    Deleted(String),
}

impl DashboardState {
    /// Next state, or `None` when the outcome is older than what is
    /// already shown. List and detail results age independently.
    pub fn apply(&self, transition: Transition) -> Option<DashboardState> {
        let mut next = self.clone();
        match transition {
            Transition::ListLoaded {
                generation,
                filter,
                mut bundles,
            } => {
                if generation <= self.list_generation {
                    return None;
                }
                sort_newest_first(&mut bundles);
                next.bundles = bundles;
                next.filter = filter;
                next.list_generation = generation;
            }
            Transition::SchoolsLoaded(schools) => {
                next.schools = schools;
            }
            Transition::DetailLoaded { generation, detail } => {
                if generation <= self.detail_generation {
                    return None;
                }
                next.detail = Some(*detail);
                next.detail_generation = generation;
            }
            Transition::DetailClosed { generation } => {
                next.detail = None;
                next.detail_generation = next.detail_generation.max(generation);
            }
            Transition::DeleteRequested(id) => {
                next.pending_delete = Some(id);
            }
            Transition::DeleteCancelled => {
                next.pending_delete = None;
            }
            Transition::Deleted(id) => {
                if next.pending_delete.as_deref() == Some(id.as_str()) {
                    next.pending_delete = None;
                }
                if next.detail.as_ref().map(|d| d.bundle.id == id).unwrap_or(false) {
                    next.detail = None;
                }
            }
        }
        Some(next)
    }

    pub fn rows(&self) -> Vec<BundleRow> {
        self.bundles
            .iter()
            .map(|b| BundleRow::new(b, &self.schools))
            .collect()
    }
}

/// Newest capture first; equal timestamps keep repository order.
pub fn sort_newest_first(bundles: &mut [Bundle]) {
    bundles.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

fn school_name(schools: &[SchoolSummary], school_id: &str) -> Option<String> {
    schools
        .iter()
        .find(|s| s.id == school_id)
        .map(|s| s.name.clone())
}

pub fn build_detail(
    bundle: Bundle,
    schools: &[SchoolSummary],
    catalog: &ClassCatalog,
    scorer: &dyn AssessmentScorer,
) -> OpenDetail {
    let raw = bundle
        .data
        .as_ref()
        .map(RawBundle::from_value)
        .unwrap_or_default();
    let students = reconcile(&raw, scorer)
        .into_iter()
        .map(|snapshot| {
            let class_id = snapshot.student.class_id.as_str();
            SnapshotRow {
                class_name: catalog.display_name(class_id),
                level: catalog.resolve(class_id),
                subjects: raw.subjects_for(class_id).to_vec(),
                snapshot,
            }
        })
        .collect();
    let collections = if bundle.data.is_some() {
        raw.collection_counts()
            .into_iter()
            .map(|(name, count)| CollectionCount { name, count })
            .collect()
    } else {
        Vec::new()
    };
    OpenDetail {
        header: BundleRow::new(&bundle, schools),
        students,
        collections,
        school_settings: raw.school_settings.clone(),
        bundle,
    }
}

/// Orchestrates list, detail, export and delete for one client session.
///
/// Operations may run concurrently; each result is applied to the shared
/// state only if nothing newer of the same kind has been applied since.
/// Identical concurrent requests are not de-duplicated.
pub struct BackupController<R> {
    repo: R,
    catalog: ClassCatalog,
    scorer: Arc<dyn AssessmentScorer>,
    day_offset: FixedOffset,
    state: Mutex<Arc<DashboardState>>,
    generation: AtomicU64,
}

impl<R: BackupRepository> BackupController<R> {
    pub fn new(repo: R, day_offset: FixedOffset) -> Self {
        Self {
            repo,
            catalog: ClassCatalog::standard(),
            scorer: Arc::new(ComponentScorer),
            day_offset,
            state: Mutex::new(Arc::new(DashboardState::default())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_catalog(mut self, catalog: ClassCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn AssessmentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn state(&self) -> Arc<DashboardState> {
        self.state.lock().clone()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn commit(&self, transition: Transition) -> bool {
        let mut guard = self.state.lock();
        match guard.apply(transition) {
            Some(next) => {
                *guard = Arc::new(next);
                true
            }
            None => false,
        }
    }

    pub async fn list(&self, filter: BackupFilter) -> Result<Vec<BundleRow>, BackupError> {
        let generation = self.next_generation();
        let predicate = build_predicate(&filter, self.day_offset);
        let mut bundles = self
            .repo
            .list_bundles(&predicate)
            .await
            .map_err(|e| surface("list", e.into()))?;
        sort_newest_first(&mut bundles);
        let rows = {
            let schools = self.state().schools.clone();
            bundles.iter().map(|b| BundleRow::new(b, &schools)).collect()
        };

        let count = bundles.len();
        let applied = self.commit(Transition::ListLoaded {
            generation,
            filter,
            bundles,
        });
        if applied {
            tracing::info!(generation, count, "backup list refreshed");
        } else {
            tracing::debug!(generation, "discarding stale backup list");
        }
        Ok(rows)
    }

    /// Re-runs the listing with the filter currently on display.
    pub async fn refresh(&self) -> Result<Vec<BundleRow>, BackupError> {
        let filter = self.state().filter.clone();
        self.list(filter).await
    }

    pub async fn schools(&self) -> Result<Vec<SchoolSummary>, BackupError> {
        let schools = self
            .repo
            .list_schools()
            .await
            .map_err(|e| surface("schools", e.into()))?;
        self.commit(Transition::SchoolsLoaded(schools.clone()));
        Ok(schools)
    }

    pub async fn detail(&self, id: &str) -> Result<OpenDetail, BackupError> {
        let generation = self.next_generation();
        let bundle = self
            .repo
            .get_bundle(id)
            .await
            .map_err(|e| surface("detail", e.into()))?;
        let schools = self.state().schools.clone();
        let detail = build_detail(bundle, &schools, &self.catalog, self.scorer.as_ref());

        if self.commit(Transition::DetailLoaded {
            generation,
            detail: Box::new(detail.clone()),
        }) {
            tracing::info!(backup_id = id, students = detail.students.len(), "detail opened");
        } else {
            tracing::debug!(backup_id = id, generation, "discarding stale detail");
        }
        Ok(detail)
    }

    pub fn close_detail(&self) {
        let generation = self.next_generation();
        self.commit(Transition::DetailClosed { generation });
    }

    /// Renders the export artifact, loading the detail first unless it is
    /// already open for `id`.
    pub async fn export(&self, id: &str) -> Result<ExportArtifact, BackupError> {
        let cached = self
            .state()
            .detail
            .as_ref()
            .filter(|d| d.bundle.id == id)
            .map(|d| d.bundle.clone());
        let bundle = match cached {
            Some(b) => b,
            None => self.detail(id).await?.bundle,
        };
        let artifact = render_artifact(&bundle).map_err(|e| surface("export", e))?;
        tracing::info!(
            backup_id = id,
            file_name = %artifact.file_name,
            bytes = artifact.body.len(),
            "export rendered"
        );
        Ok(artifact)
    }

    pub fn request_delete(&self, id: &str) {
        self.commit(Transition::DeleteRequested(id.to_string()));
    }

    pub fn cancel_delete(&self) {
        self.commit(Transition::DeleteCancelled);
    }

    /// Deletes the pending bundle, then re-fetches the list with the current
    /// filter whatever the delete outcome. Returns the deleted id, or
    /// `None` when no delete was pending.
    pub async fn confirm_delete(&self) -> Result<Option<String>, BackupError> {
        let Some(id) = self.state().pending_delete.clone() else {
            return Ok(None);
        };
        let deleted = self.repo.delete_bundle(&id).await;
        match &deleted {
            Ok(()) => {
                tracing::info!(backup_id = %id, "backup deleted");
                self.commit(Transition::Deleted(id.clone()));
            }
            Err(e) => tracing::warn!(backup_id = %id, error = %e, "backup delete failed"),
        }
        let refreshed = self.refresh().await;
        deleted.map_err(|e| surface("delete", e.into()))?;
        refreshed?;
        Ok(Some(id))
    }
}

fn surface(op: &'static str, e: BackupError) -> BackupError {
    tracing::warn!(op, code = e.code(), error = %e, "backup operation failed");
    e
}
