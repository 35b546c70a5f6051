use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use learnhub_core::db::open_db_in_memory;
use learnhub_core::{
    Assignment, CatalogRepository, CatalogService, CompositeKind, CompositionService, ContentId,
    ContentRef, ContentType, LifecycleStatus, Module, ProgressRecord, QuestionDraft,
    QuestionType, RootFields, SectionDraft, SqliteCatalogRepository, SqliteCompositeRepository,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn publish_module(repo: &SqliteCatalogRepository<'_>, title: &str) -> ContentId {
    let mut module = Module::new(title, "module body");
    module.status = LifecycleStatus::Published;
    module.meta.duration_minutes = Some(30);
    module.meta.credits = 2;
    repo.create_module(&module).unwrap()
}

fn create_composite(conn: &Connection, kind: CompositeKind, title: &str, status: LifecycleStatus) -> ContentId {
    let service = CompositionService::new(SqliteCompositeRepository::try_new(conn, kind).unwrap());
    let mut fields = RootFields::new(title);
    fields.status = status;
    let tree = vec![SectionDraft::new(
        "Only",
        vec![QuestionDraft::new(QuestionType::SingleChoice, "Ready?").with_options(["Yes", "No"])],
    )];
    service.create(&fields, &tree).unwrap().root.id
}

fn assign(
    repo: &SqliteCatalogRepository<'_>,
    org: &str,
    content: ContentRef,
    opens: (NaiveDate, &str),
    due: (NaiveDate, &str),
) {
    repo.create_assignment(&Assignment::new(org, content).with_window(opens, due))
        .unwrap();
}

#[test]
fn only_currently_active_assignments_reach_the_catalog() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let m1 = publish_module(&repo, "M1");
    let a1 = create_composite(&conn, CompositeKind::Assessment, "A1", LifecycleStatus::Published);
    let s1 = create_composite(&conn, CompositeKind::Survey, "S1", LifecycleStatus::Published);

    assign(&repo, "org-1", ContentRef::Module(m1), (day(1), "08:00"), (day(20), "18:00"));
    assign(&repo, "org-1", ContentRef::Assessment(a1), (day(1), "08:00"), (day(9), "18:00"));
    assign(&repo, "org-1", ContentRef::Survey(s1), (day(11), "08:00"), (day(20), "18:00"));

    let items = CatalogService::new(repo)
        .build_catalog("learner-1", "org-1", now())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content_id, m1);
    assert_eq!(items[0].content_type, ContentType::Module);
    assert_eq!(items[0].title, "M1");
    assert_eq!(items[0].duration, Some(30));
    assert_eq!(items[0].credits, 2);
    assert!(!items[0].in_progress);
}

#[test]
fn progress_marks_items_in_progress_per_learner() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let m1 = publish_module(&repo, "M1");
    let m2 = publish_module(&repo, "M2");
    for id in [m1, m2] {
        assign(&repo, "org-1", ContentRef::Module(id), (day(1), "00:00"), (day(31), "23:59"));
    }
    repo.record_progress(&ProgressRecord {
        learner_id: "learner-1".to_string(),
        content_id: m1,
        marker: "slide-2".to_string(),
    })
    .unwrap();
    repo.record_progress(&ProgressRecord {
        learner_id: "learner-1".to_string(),
        content_id: m1,
        marker: "slide-5".to_string(),
    })
    .unwrap();

    let service = CatalogService::new(repo);
    let items = service.build_catalog("learner-1", "org-1", now()).unwrap();
    let flags = items
        .iter()
        .map(|item| (item.content_id, item.in_progress))
        .collect::<Vec<_>>();
    assert_eq!(flags.len(), 2);
    assert!(flags.contains(&(m1, true)));
    assert!(flags.contains(&(m2, false)));

    let other = service.build_catalog("learner-2", "org-1", now()).unwrap();
    assert!(other.iter().all(|item| !item.in_progress));

    let markers: i64 = conn
        .query_row("SELECT COUNT(*) FROM progress;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(markers, 1);
}

#[test]
fn unpublished_and_foreign_org_content_is_excluded() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let draft_survey = create_composite(&conn, CompositeKind::Survey, "Draft", LifecycleStatus::Draft);
    let live_survey = create_composite(&conn, CompositeKind::Survey, "Live", LifecycleStatus::Published);
    let other_org_module = publish_module(&repo, "Elsewhere");

    assign(&repo, "org-1", ContentRef::Survey(draft_survey), (day(1), "08:00"), (day(20), "18:00"));
    assign(&repo, "org-1", ContentRef::Survey(live_survey), (day(1), "08:00"), (day(20), "18:00"));
    assign(&repo, "org-2", ContentRef::Module(other_org_module), (day(1), "08:00"), (day(20), "18:00"));

    let items = CatalogService::new(repo)
        .build_catalog("learner-1", "org-1", now())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content_id, live_survey);
    assert_eq!(items[0].content_type, ContentType::Survey);
}

#[test]
fn content_type_mismatch_is_not_resolved() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let survey = create_composite(&conn, CompositeKind::Survey, "Survey", LifecycleStatus::Published);
    assign(&repo, "org-1", ContentRef::Assessment(survey), (day(1), "08:00"), (day(20), "18:00"));

    let items = CatalogService::new(repo)
        .build_catalog("learner-1", "org-1", now())
        .unwrap();
    assert!(items.is_empty());
}

#[test]
fn unparseable_stored_date_only_disables_its_own_assignment() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();

    let m1 = publish_module(&repo, "M1");
    let m2 = publish_module(&repo, "M2");
    assign(&repo, "org-1", ContentRef::Module(m1), (day(1), "08:00"), (day(20), "18:00"));
    for (assign_date, due_date) in [("2026/05/01", "2026-05-20"), ("2026-05-01", "20th of May")] {
        conn.execute(
            "INSERT INTO assignments (
                uuid, organization_id, content_type, content_uuid,
                assign_date, assign_time, due_date, due_time, recurring, notify_users
            ) VALUES (?1, 'org-1', 'module', ?2, ?3, '08:00', ?4, '18:00', 0, 0);",
            params![
                Uuid::new_v4().to_string(),
                m2.to_string(),
                assign_date,
                due_date
            ],
        )
        .unwrap();
    }

    let items = CatalogService::new(repo)
        .build_catalog("learner-1", "org-1", now())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content_id, m1);
}

#[test]
fn assignment_flags_are_stored_as_written() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();
    let m1 = publish_module(&repo, "M1");
    let mut assignment = Assignment::new("org-1", ContentRef::Module(m1))
        .with_window((day(1), "08:00"), (day(20), "18:00"));
    assignment.recurring = true;
    repo.create_assignment(&assignment).unwrap();

    let stored = repo.list_assignments("org-1").unwrap();
    assert_eq!(stored, vec![assignment]);
    assert!(stored[0].recurring);
    assert!(!stored[0].notify_users);
}

#[test]
fn catalog_item_serializes_with_camel_case_keys() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCatalogRepository::try_new(&conn).unwrap();
    let m1 = publish_module(&repo, "M1");
    assign(&repo, "org-1", ContentRef::Module(m1), (day(10), "12:00"), (day(10), "12:00"));

    let items = CatalogService::new(repo)
        .build_catalog("learner-1", "org-1", now())
        .unwrap();
    let json = serde_json::to_value(&items[0]).unwrap();
    assert_eq!(json["contentId"], m1.to_string());
    assert_eq!(json["inProgress"], false);
    assert_eq!(json["duration"], 30);
}
