// tests/integration/postgres/provider_tests.rs

use crate::common;
use crate::common::app_helper::{ADMIN, DEVELOPER, MEMBER, OWNER};
use crate::common::db::TestDatabase;
use crate::common::request::{add_change, changes_body, json_request, remove_change, send};
use axum::http::StatusCode;
use permission_backend::api::AppState;
use permission_backend::app_router;
use permission_backend::config::AppConfig;
use permission_backend::domain::execution_plan::{
    ApplyMode, ExecutionPlan, PlannedMutation, Precondition,
};
use permission_backend::domain::membership_snapshot::SnapshotRequest;
use permission_backend::domain::organization_member_model as organization_member;
use permission_backend::domain::permission_change::{
    ChangeRequest, IdentityKey, NormalizedMutation,
};
use permission_backend::domain::permission_error::ErrorKind;
use permission_backend::domain::role_model::Role;
use permission_backend::domain::scope::Scope;
use permission_backend::error::AppError;
use permission_backend::repository::{MembershipRepository, MembershipStateProvider};
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

fn step(index: usize, request: ChangeRequest, expected: Option<Role>) -> PlannedMutation {
    PlannedMutation {
        step: index,
        mutation: NormalizedMutation::from_request(&request, index),
        precondition: Precondition {
            expected_role: expected,
        },
    }
}

struct Seeded {
    repository: MembershipRepository,
    organization: Scope,
    project: Scope,
    owner: Uuid,
    member: Uuid,
    outsider: Uuid,
}

async fn seed(db: &TestDatabase) -> Seeded {
    common::init_test_env();
    let repository = MembershipRepository::new(db.connection.clone());
    let organization = repository.create_organization("Acme").await.unwrap();
    let project = repository
        .create_project("Rocket", Some(organization.id))
        .await
        .unwrap();
    repository.create_project("Side project", None).await.unwrap();
    let owner = repository
        .create_user("owner", "owner@example.com", false)
        .await
        .unwrap();
    let member = repository
        .create_user("member", "member@example.com", false)
        .await
        .unwrap();
    let outsider = repository
        .create_user("outsider", "outsider@example.com", false)
        .await
        .unwrap();

    let organization = Scope::Organization(organization.id);
    repository.grant(owner.id, organization, OWNER).await.unwrap();
    repository
        .grant(member.id, organization, MEMBER)
        .await
        .unwrap();

    Seeded {
        repository,
        organization,
        project: Scope::Project(project.id),
        owner: owner.id,
        member: member.id,
        outsider: outsider.id,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_snapshot_loads_touched_scopes_and_owning_organization() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;

    let mut request = SnapshotRequest::for_actor(seeded.owner);
    request.include(&IdentityKey::new(seeded.member, seeded.project));
    let snapshot = seeded.repository.snapshot(&request).await.unwrap();

    assert!(snapshot.has_scope(&seeded.project));
    assert!(snapshot.has_scope(&seeded.organization));
    assert_eq!(
        snapshot.role_of(&IdentityKey::new(seeded.member, seeded.organization)),
        Some(MEMBER)
    );
    assert_eq!(
        snapshot.role_of(&IdentityKey::new(seeded.owner, seeded.organization)),
        Some(OWNER)
    );
    assert!(snapshot.user(seeded.member).is_some_and(|user| user.is_active));

    let totals = seeded.repository.directory_totals().await.unwrap();
    assert_eq!(totals.users, 3);
    assert_eq!(totals.organizations, 1);
    assert_eq!(totals.projects, 2);
    assert_eq!(totals.independent_projects, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_best_effort_commits_each_step_independently() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;
    let plan = ExecutionPlan {
        steps: vec![
            step(
                0,
                ChangeRequest::add(seeded.outsider, seeded.organization, MEMBER),
                None,
            ),
            // 実際は MEMBER を持つため前提条件を満たさない
            step(
                1,
                ChangeRequest::add(seeded.member, seeded.organization, ADMIN),
                None,
            ),
            step(
                2,
                ChangeRequest::add(seeded.member, seeded.project, DEVELOPER),
                None,
            ),
        ],
    };

    let report = seeded
        .repository
        .apply(&plan, ApplyMode::BestEffort)
        .await
        .unwrap();

    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error_kind, ErrorKind::PreconditionFailed);
    let repository = &seeded.repository;
    assert_eq!(
        repository
            .role_of(seeded.outsider, seeded.organization)
            .await
            .unwrap(),
        Some(MEMBER)
    );
    assert_eq!(
        repository
            .role_of(seeded.member, seeded.organization)
            .await
            .unwrap(),
        Some(MEMBER)
    );
    assert_eq!(
        repository
            .role_of(seeded.member, seeded.project)
            .await
            .unwrap(),
        Some(DEVELOPER)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_atomic_failure_leaves_database_untouched() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;
    let plan = ExecutionPlan {
        steps: vec![
            step(
                0,
                ChangeRequest::add(seeded.outsider, seeded.organization, MEMBER),
                None,
            ),
            step(
                1,
                ChangeRequest::remove(seeded.member, seeded.organization),
                Some(ADMIN),
            ),
        ],
    };

    let report = seeded
        .repository
        .apply(&plan, ApplyMode::Atomic)
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.failed[0].error_kind, ErrorKind::RolledBack);
    assert_eq!(report.failed[1].error_kind, ErrorKind::PreconditionFailed);
    assert_eq!(
        seeded
            .repository
            .role_of(seeded.outsider, seeded.organization)
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        seeded
            .repository
            .role_of(seeded.member, seeded.organization)
            .await
            .unwrap(),
        Some(MEMBER)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bulk_changes_against_postgres() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;
    let app = app_router(AppState::new(
        AppConfig::for_testing(),
        Arc::new(MembershipRepository::new(db.connection.clone())),
    ));
    let body = changes_body(vec![
        add_change(seeded.outsider, seeded.project, DEVELOPER),
        add_change(seeded.outsider, seeded.organization, MEMBER),
        remove_change(seeded.member, seeded.organization),
    ]);

    let (status, response) = send(
        &app,
        json_request("POST", "/api/user-permissions/bulk-changes", seeded.owner, &body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["applied"].as_array().unwrap().len(), 3);
    let repository = &seeded.repository;
    assert_eq!(
        repository
            .role_of(seeded.outsider, seeded.project)
            .await
            .unwrap(),
        Some(DEVELOPER)
    );
    assert_eq!(
        repository
            .role_of(seeded.member, seeded.organization)
            .await
            .unwrap(),
        None
    );
    let assignments = repository.list_assignments().await.unwrap();
    assert_eq!(assignments.len(), 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_best_effort_skips_removal_whose_replacement_failed() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;
    // 後継者は既に MEMBER のため OWNER 付与の前提条件を満たさない
    let grant = step(
        0,
        ChangeRequest::add(seeded.member, seeded.organization, OWNER),
        None,
    );
    let mut removal = step(
        1,
        ChangeRequest::remove(seeded.owner, seeded.organization),
        Some(OWNER),
    );
    removal.mutation.depends_on.push(grant.mutation.key);
    let plan = ExecutionPlan {
        steps: vec![grant, removal],
    };

    let report = seeded
        .repository
        .apply(&plan, ApplyMode::BestEffort)
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[1].mutation.key.user_id, seeded.owner);
    assert_eq!(report.failed[1].error_kind, ErrorKind::PreconditionFailed);
    assert_eq!(
        seeded
            .repository
            .role_of(seeded.owner, seeded.organization)
            .await
            .unwrap(),
        Some(OWNER)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unknown_stored_role_is_an_internal_error() {
    let db = TestDatabase::new().await;
    let seeded = seed(&db).await;
    let now = chrono::Utc::now();
    organization_member::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(seeded.organization.id()),
        user_id: Set(seeded.outsider),
        role: Set("SUPERUSER".to_string()),
        joined_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&db.connection)
    .await
    .unwrap();

    let mut request = SnapshotRequest::for_actor(seeded.owner);
    request.include(&IdentityKey::new(seeded.outsider, seeded.organization));
    let snapshot = seeded.repository.snapshot(&request).await;
    assert!(matches!(snapshot, Err(AppError::InternalServerError(_))));

    let assignments = seeded.repository.list_assignments().await;
    assert!(matches!(assignments, Err(AppError::InternalServerError(_))));
}
