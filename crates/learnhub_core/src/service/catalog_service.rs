//! Learner catalog aggregation.
//!
//! # Responsibility
//! - Resolve an organization's active assignments to published content.
//! - Merge per-learner progress into one catalog.
//!
//! # Invariants
//! - Only assignments whose window contains `now` contribute items.
//! - Each active, published, assigned item appears exactly once.
//! - Any failed fetch fails the whole call; no partial catalog is returned.

use crate::model::assignment::Assignment;
use crate::model::catalog::CatalogItem;
use crate::model::content::{ContentId, ContentType};
use crate::repo::catalog_repo::CatalogRepository;
use crate::repo::RepoError;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use thiserror::Error;

/// Append order of content types in a catalog.
const CATALOG_ORDER: [ContentType; 3] = [
    ContentType::Module,
    ContentType::Assessment,
    ContentType::Survey,
];

/// Fetch step of catalog aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStage {
    Assignments,
    Content(ContentType),
    Progress,
}

impl std::fmt::Display for CatalogStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assignments => f.write_str("assignments"),
            Self::Content(content_type) => write!(f, "{content_type} content"),
            Self::Progress => f.write_str("progress"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog aggregation failed while fetching {stage}")]
    Aggregation {
        stage: CatalogStage,
        #[source]
        source: RepoError,
    },
}

/// Catalog service facade over repository implementations.
pub struct CatalogService<R: CatalogRepository> {
    repo: R,
}

impl<R: CatalogRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds the catalog of one learner in one organization at `now`.
    ///
    /// Items are appended modules first, then assessments, then surveys.
    pub fn build_catalog(
        &self,
        learner_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let started_at = Instant::now();
        let result = self.aggregate(learner_id, organization_id, now);
        match &result {
            Ok(items) => info!(
                "event=catalog_build module=catalog status=ok items={} duration_ms={}",
                items.len(),
                started_at.elapsed().as_millis()
            ),
            Err(CatalogError::Aggregation { stage, source }) => error!(
                "event=catalog_build module=catalog status=error stage=\"{stage}\" duration_ms={} error={source}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn aggregate(
        &self,
        learner_id: &str,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let assignments = self
            .repo
            .list_assignments(organization_id)
            .map_err(at(CatalogStage::Assignments))?;
        let partitions = partition_active(&assignments, now);
        debug!(
            "event=catalog_partition module=catalog status=ok assignments={} active_refs={}",
            assignments.len(),
            partitions.values().map(BTreeSet::len).sum::<usize>()
        );

        let mut fetched = Vec::with_capacity(CATALOG_ORDER.len());
        for content_type in CATALOG_ORDER {
            let Some(ids) = partitions.get(&content_type) else {
                continue;
            };
            let items = self
                .repo
                .list_published(content_type, ids)
                .map_err(at(CatalogStage::Content(content_type)))?;
            fetched.push((content_type, items));
        }

        let in_progress: HashSet<ContentId> = self
            .repo
            .list_progress(learner_id)
            .map_err(at(CatalogStage::Progress))?
            .into_iter()
            .map(|record| record.content_id)
            .collect();

        Ok(fetched
            .into_iter()
            .flat_map(|(content_type, items)| {
                let in_progress = &in_progress;
                items.into_iter().map(move |summary| {
                    let started = in_progress.contains(&summary.id);
                    CatalogItem::from_summary(content_type, summary, started)
                })
            })
            .collect())
    }
}

/// Groups referenced ids of active assignments by content type.
fn partition_active(
    assignments: &[Assignment],
    now: DateTime<Utc>,
) -> BTreeMap<ContentType, BTreeSet<ContentId>> {
    let mut partitions: BTreeMap<ContentType, BTreeSet<ContentId>> = BTreeMap::new();
    for assignment in assignments.iter().filter(|a| a.is_active_at(now)) {
        partitions
            .entry(assignment.content.content_type())
            .or_default()
            .insert(assignment.content.id());
    }
    partitions
}

fn at(stage: CatalogStage) -> impl FnOnce(RepoError) -> CatalogError {
    move |source| CatalogError::Aggregation { stage, source }
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, CatalogService, CatalogStage};
    use crate::model::assignment::{Assignment, ContentRef, ProgressRecord};
    use crate::model::catalog::ContentSummary;
    use crate::model::content::{ContentId, ContentMeta, ContentType};
    use crate::repo::catalog_repo::CatalogRepository;
    use crate::repo::{RepoError, RepoResult};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeCatalog {
        assignments: Vec<Assignment>,
        published: Vec<(ContentType, ContentSummary)>,
        progress: Vec<ProgressRecord>,
        fail_on: Option<CatalogStage>,
        requested: RefCell<Vec<(ContentType, BTreeSet<ContentId>)>>,
    }

    impl FakeCatalog {
        fn check(&self, stage: CatalogStage) -> RepoResult<()> {
            if self.fail_on == Some(stage) {
                return Err(RepoError::InvalidData(format!("injected {stage} failure")));
            }
            Ok(())
        }
    }

    impl CatalogRepository for FakeCatalog {
        fn list_assignments(&self, organization_id: &str) -> RepoResult<Vec<Assignment>> {
            self.check(CatalogStage::Assignments)?;
            Ok(self
                .assignments
                .iter()
                .filter(|a| a.organization_id == organization_id)
                .cloned()
                .collect())
        }

        fn list_published(
            &self,
            content_type: ContentType,
            ids: &BTreeSet<ContentId>,
        ) -> RepoResult<Vec<ContentSummary>> {
            self.check(CatalogStage::Content(content_type))?;
            self.requested
                .borrow_mut()
                .push((content_type, ids.clone()));
            Ok(self
                .published
                .iter()
                .filter(|(kind, item)| *kind == content_type && ids.contains(&item.id))
                .map(|(_, item)| item.clone())
                .collect())
        }

        fn list_progress(&self, learner_id: &str) -> RepoResult<Vec<ProgressRecord>> {
            self.check(CatalogStage::Progress)?;
            Ok(self
                .progress
                .iter()
                .filter(|record| record.learner_id == learner_id)
                .cloned()
                .collect())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn summary(title: &str) -> ContentSummary {
        ContentSummary {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            tags: Vec::new(),
            meta: ContentMeta::default(),
        }
    }

    fn active(content: ContentRef) -> Assignment {
        Assignment::new("org-1", content).with_window((day(1), "08:00"), (day(20), "18:00"))
    }

    #[test]
    fn only_active_assignments_reach_content_fetch() {
        let module = summary("Module");
        let assessment = summary("Assessment");
        let survey = summary("Survey");
        let fake = FakeCatalog {
            assignments: vec![
                active(ContentRef::Module(module.id)),
                Assignment::new("org-1", ContentRef::Assessment(assessment.id))
                    .with_window((day(1), "08:00"), (day(9), "18:00")),
                Assignment::new("org-1", ContentRef::Survey(survey.id))
                    .with_window((day(11), "08:00"), (day(20), "18:00")),
            ],
            published: vec![
                (ContentType::Module, module.clone()),
                (ContentType::Assessment, assessment),
                (ContentType::Survey, survey),
            ],
            ..FakeCatalog::default()
        };
        let service = CatalogService::new(fake);

        let items = service.build_catalog("learner", "org-1", now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content_id, module.id);
        assert_eq!(items[0].content_type, ContentType::Module);
        assert!(!items[0].in_progress);

        let requested = service.repo.requested.borrow();
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[0].0, ContentType::Module);
    }

    #[test]
    fn duplicate_assignments_yield_one_item() {
        let module = summary("Module");
        let fake = FakeCatalog {
            assignments: vec![
                active(ContentRef::Module(module.id)),
                active(ContentRef::Module(module.id)),
            ],
            published: vec![(ContentType::Module, module.clone())],
            progress: vec![ProgressRecord {
                learner_id: "learner".to_string(),
                content_id: module.id,
                marker: "slide-3".to_string(),
            }],
            ..FakeCatalog::default()
        };
        let items = CatalogService::new(fake)
            .build_catalog("learner", "org-1", now())
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].in_progress);
    }

    #[test]
    fn append_order_is_modules_assessments_surveys() {
        let module = summary("M");
        let assessment = summary("A");
        let survey = summary("S");
        let fake = FakeCatalog {
            assignments: vec![
                active(ContentRef::Survey(survey.id)),
                active(ContentRef::Assessment(assessment.id)),
                active(ContentRef::Module(module.id)),
            ],
            published: vec![
                (ContentType::Survey, survey),
                (ContentType::Assessment, assessment),
                (ContentType::Module, module),
            ],
            ..FakeCatalog::default()
        };
        let kinds = CatalogService::new(fake)
            .build_catalog("learner", "org-1", now())
            .unwrap()
            .into_iter()
            .map(|item| item.content_type)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![ContentType::Module, ContentType::Assessment, ContentType::Survey]
        );
    }

    #[test]
    fn any_failed_fetch_fails_whole_catalog() {
        for stage in [
            CatalogStage::Assignments,
            CatalogStage::Content(ContentType::Survey),
            CatalogStage::Progress,
        ] {
            let module = summary("M");
            let survey = summary("S");
            let fake = FakeCatalog {
                assignments: vec![
                    active(ContentRef::Module(module.id)),
                    active(ContentRef::Survey(survey.id)),
                ],
                published: vec![
                    (ContentType::Module, module),
                    (ContentType::Survey, survey),
                ],
                fail_on: Some(stage),
                ..FakeCatalog::default()
            };
            let err = CatalogService::new(fake)
                .build_catalog("learner", "org-1", now())
                .unwrap_err();
            let CatalogError::Aggregation { stage: failed, .. } = err;
            assert_eq!(failed, stage);
        }
    }

    #[test]
    fn no_active_assignments_skips_content_fetches() {
        let fake = FakeCatalog {
            fail_on: Some(CatalogStage::Content(ContentType::Module)),
            ..FakeCatalog::default()
        };
        let items = CatalogService::new(fake)
            .build_catalog("learner", "org-1", now())
            .unwrap();
        assert!(items.is_empty());
    }
}
