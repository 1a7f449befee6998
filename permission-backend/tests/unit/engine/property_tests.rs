// tests/unit/engine/property_tests.rs
//! 正規化・解決・計画・適用の振る舞いに関する性質テスト

use crate::common;
use crate::common::app_helper::{ADMIN, DEVELOPER, MEMBER, OWNER, PROJECT_MANAGER, VIEWER};
use permission_backend::domain::conflict::{ConflictKind, ConflictReason, Severity};
use permission_backend::domain::execution_plan::ApplyMode;
use permission_backend::domain::membership_snapshot::{Actor, MembershipSnapshot, SnapshotRequest};
use permission_backend::domain::permission_change::{
    CallerDecision, ChangeAction, ChangeRequest, IdentityKey,
};
use permission_backend::domain::permission_error::ErrorKind;
use permission_backend::domain::role_model::{ProjectRole, Role};
use permission_backend::domain::scope::Scope;
use permission_backend::repository::{InMemoryMembershipRepository, MembershipStateProvider};
use permission_backend::service::permission_engine::normalizer::expand;
use permission_backend::service::permission_engine::PermissionChangeEngine;
use uuid::Uuid;

const TESTER: Role = Role::Project(ProjectRole::Tester);

fn net_effects(requests: &[ChangeRequest]) -> Vec<(IdentityKey, ChangeAction, Option<Role>)> {
    PermissionChangeEngine::default()
        .normalize(requests)
        .unwrap()
        .mutations
        .iter()
        .map(|mutation| mutation.net_effect())
        .collect()
}

/// 組織 1 つ、プロジェクト 1 つ、唯一の OWNER を持つスナップショット
struct Fixture {
    organization: Scope,
    project: Scope,
    owner: Uuid,
    snapshot: MembershipSnapshot,
}

impl Fixture {
    fn new() -> Self {
        let organization_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let organization = Scope::Organization(organization_id);
        let snapshot = MembershipSnapshot::new()
            .with_organization(organization_id)
            .with_project(project_id, Some(organization_id))
            .with_user(owner, true)
            .with_assignment(owner, organization, OWNER);
        Self {
            organization,
            project: Scope::Project(project_id),
            owner,
            snapshot,
        }
    }

    fn with_user(mut self, user_id: Uuid) -> Self {
        self.snapshot = self.snapshot.with_user(user_id, true);
        self
    }

    fn with_assignment(mut self, user_id: Uuid, scope: Scope, role: Role) -> Self {
        self.snapshot = self.snapshot.with_assignment(user_id, scope, role);
        self
    }

    fn actor(&self) -> Actor {
        Actor::new(self.owner, false)
    }
}

#[test]
fn test_normalization_is_idempotent() {
    let organization = Scope::Organization(Uuid::new_v4());
    let project = Scope::Project(Uuid::new_v4());
    let (first, second, third) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let requests = vec![
        ChangeRequest::add(first, organization, MEMBER),
        ChangeRequest::remove(second, organization),
        ChangeRequest::add(first, organization, ADMIN),
        ChangeRequest::change_role(third, project, DEVELOPER),
        ChangeRequest::change_role(third, project, TESTER),
        ChangeRequest::add(second, organization, MEMBER),
        ChangeRequest::remove(third, project),
        ChangeRequest::add(first, project, VIEWER),
    ];
    let engine = PermissionChangeEngine::default();

    let once = engine.normalize(&requests).unwrap();
    let expanded = expand(&once.mutations);
    let twice = engine.normalize(&expanded).unwrap();

    assert_eq!(net_effects(&requests), net_effects(&expanded));
    assert!(twice
        .mutations
        .iter()
        .all(|mutation| mutation.superseded_count == 0));
    assert_eq!(expand(&twice.mutations), expanded);
    // 1キー1件に畳み込まれ、初出順が保たれる
    let keys: Vec<IdentityKey> = once.mutations.iter().map(|m| m.key).collect();
    assert_eq!(
        keys,
        vec![
            IdentityKey::new(first, organization),
            IdentityKey::new(second, organization),
            IdentityKey::new(third, project),
            IdentityKey::new(first, project),
        ]
    );
}

#[test]
fn test_later_change_role_overrides_earlier_add() {
    let organization = Scope::Organization(Uuid::new_v4());
    let user = Uuid::new_v4();

    let effects = net_effects(&[
        ChangeRequest::add(user, organization, MEMBER),
        ChangeRequest::change_role(user, organization, ADMIN),
    ]);

    assert_eq!(
        effects,
        vec![(
            IdentityKey::new(user, organization),
            ChangeAction::Add,
            Some(ADMIN)
        )]
    );
}

#[test]
fn test_resolution_is_deterministic() {
    let joining = Uuid::new_v4();
    let leaving = Uuid::new_v4();
    let fixture = Fixture::new().with_user(joining).with_user(leaving);
    let organization = fixture.organization;
    let fixture = fixture.with_assignment(leaving, organization, MEMBER);
    let leaving_key = IdentityKey::new(leaving, organization);
    let engine = PermissionChangeEngine::default();
    let requests = vec![
        ChangeRequest::add(joining, fixture.project, DEVELOPER),
        ChangeRequest::add(joining, fixture.organization, MEMBER),
        ChangeRequest::add(leaving, fixture.project, VIEWER),
        ChangeRequest::remove(leaving, fixture.organization),
        ChangeRequest::remove(Uuid::new_v4(), fixture.organization),
        ChangeRequest::change_role(fixture.owner, fixture.organization, ADMIN),
    ];
    let batch = engine.normalize(&requests).unwrap();
    let conflicts = engine.detect(&batch, &fixture.snapshot, &fixture.actor());
    let decisions = vec![CallerDecision::reject(leaving_key)];

    let first = engine.resolve(&conflicts, &batch.mutations, &decisions);
    let second = engine.resolve(&conflicts, &batch.mutations, &decisions);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first.resolved_conflicts).unwrap(),
        serde_json::to_string(&second.resolved_conflicts).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.remaining_conflicts).unwrap(),
        serde_json::to_string(&second.remaining_conflicts).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.resolved_mutations).unwrap(),
        serde_json::to_string(&second.resolved_mutations).unwrap()
    );
}

#[test]
fn test_redundant_grant_is_detected_and_dropped() {
    let user = Uuid::new_v4();
    let fixture = Fixture::new().with_user(user);
    let organization = fixture.organization;
    let fixture = fixture.with_assignment(user, organization, MEMBER);
    let engine = PermissionChangeEngine::default();
    let batch = engine
        .normalize(&[ChangeRequest::add(user, fixture.organization, MEMBER)])
        .unwrap();

    let conflicts = engine.detect(&batch, &fixture.snapshot, &fixture.actor());
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::Redundant);
    assert!(conflicts[0].can_auto_resolve);

    let resolution = engine.resolve(&conflicts, &batch.mutations, &[]);
    assert!(resolution.resolved_mutations.is_empty());
    assert_eq!(resolution.skipped_mutations.len(), 1);
    assert_eq!(resolution.unresolved_blocking_count(), 0);
}

#[test]
fn test_last_owner_removal_requires_replacement_grant() {
    let successor = Uuid::new_v4();
    let fixture = Fixture::new().with_user(successor);
    let engine = PermissionChangeEngine::default();
    let removal = ChangeRequest::remove(fixture.owner, fixture.organization);

    let blocked = engine.evaluate(
        engine.normalize(std::slice::from_ref(&removal)).unwrap(),
        &fixture.snapshot,
        &fixture.actor(),
        &[],
    );
    assert_eq!(blocked.unresolved_blocking_count(), 1);
    assert_eq!(blocked.conflicts[0].reason, ConflictReason::LastOwnerRemoval);
    assert_eq!(blocked.conflicts[0].severity, Severity::Blocking);

    let evaluation = engine.evaluate(
        engine
            .normalize(&[
                ChangeRequest::add(successor, fixture.organization, OWNER),
                removal,
            ])
            .unwrap(),
        &fixture.snapshot,
        &fixture.actor(),
        &[],
    );
    assert_eq!(evaluation.unresolved_blocking_count(), 0);
    let planned: Vec<(Uuid, ChangeAction)> = evaluation
        .plan
        .mutations()
        .map(|mutation| (mutation.key.user_id, mutation.action))
        .collect();
    assert_eq!(
        planned,
        vec![
            (successor, ChangeAction::Add),
            (fixture.owner, ChangeAction::Remove)
        ]
    );
}

#[test]
fn test_replacement_owner_submitted_after_removal_is_ordered_first() {
    let successor = Uuid::new_v4();
    let fixture = Fixture::new().with_user(successor);
    let engine = PermissionChangeEngine::default();

    let evaluation = engine.evaluate(
        engine
            .normalize(&[
                ChangeRequest::remove(fixture.owner, fixture.organization),
                ChangeRequest::add(successor, fixture.organization, OWNER),
            ])
            .unwrap(),
        &fixture.snapshot,
        &fixture.actor(),
        &[],
    );

    assert_eq!(evaluation.unresolved_blocking_count(), 0);
    let planned: Vec<(Uuid, ChangeAction)> = evaluation
        .plan
        .mutations()
        .map(|mutation| (mutation.key.user_id, mutation.action))
        .collect();
    assert_eq!(
        planned,
        vec![
            (successor, ChangeAction::Add),
            (fixture.owner, ChangeAction::Remove)
        ]
    );
}

#[test]
fn test_accepting_last_owner_removal_overrides_block() {
    let fixture = Fixture::new();
    let engine = PermissionChangeEngine::default();
    let key = IdentityKey::new(fixture.owner, fixture.organization);

    let evaluation = engine.evaluate(
        engine
            .normalize(&[ChangeRequest::remove(fixture.owner, fixture.organization)])
            .unwrap(),
        &fixture.snapshot,
        &fixture.actor(),
        &[CallerDecision::accept(key)],
    );

    assert_eq!(evaluation.unresolved_blocking_count(), 0);
    assert_eq!(evaluation.plan.len(), 1);
}

#[test]
fn test_rejected_prerequisite_escalates_dependent_grant() {
    let joining = Uuid::new_v4();
    let fixture = Fixture::new().with_user(joining);
    let engine = PermissionChangeEngine::default();
    let organization_key = IdentityKey::new(joining, fixture.organization);
    let batch = engine
        .normalize(&[
            ChangeRequest::add(joining, fixture.project, PROJECT_MANAGER),
            ChangeRequest::add(joining, fixture.organization, MEMBER),
        ])
        .unwrap();

    let ordered = engine.evaluate(batch.clone(), &fixture.snapshot, &fixture.actor(), &[]);
    assert_eq!(ordered.unresolved_blocking_count(), 0);
    assert_eq!(ordered.plan.len(), 2);

    let escalated = engine.evaluate(
        batch,
        &fixture.snapshot,
        &fixture.actor(),
        &[CallerDecision::reject(organization_key)],
    );
    assert_eq!(escalated.unresolved_blocking_count(), 1);
    assert_eq!(
        escalated.resolution.remaining_conflicts[0].kind,
        ConflictKind::HierarchyViolation
    );
    assert!(escalated.plan.is_empty());
}

#[test]
fn test_statistics_count_each_action_and_scope() {
    let organization = Scope::Organization(Uuid::new_v4());
    let project = Scope::Project(Uuid::new_v4());
    let engine = PermissionChangeEngine::default();
    let requests = vec![
        ChangeRequest::add(Uuid::new_v4(), organization, MEMBER),
        ChangeRequest::add(Uuid::new_v4(), project, DEVELOPER),
        ChangeRequest::add(Uuid::new_v4(), project, VIEWER),
        ChangeRequest::remove(Uuid::new_v4(), organization),
        ChangeRequest::change_role(Uuid::new_v4(), organization, ADMIN),
        ChangeRequest::change_role(Uuid::new_v4(), project, TESTER),
    ];
    let batch = engine.normalize(&requests).unwrap();

    let statistics = engine.summarize(&batch.mutations);

    assert_eq!(statistics.adds, 3);
    assert_eq!(statistics.removes, 1);
    assert_eq!(statistics.role_changes, 2);
    assert_eq!(
        statistics
            .by_scope
            .values()
            .map(|counts| counts.total)
            .sum::<usize>(),
        6
    );
}

/// 3件の計画のうち2件目が適用時に前提条件を満たさなくなる状況を作る
async fn plan_with_concurrent_change(
    mode: ApplyMode,
) -> (
    InMemoryMembershipRepository,
    Scope,
    [Uuid; 3],
    permission_backend::domain::execution_plan::ApplyReport,
) {
    common::init_test_env();
    let repository = InMemoryMembershipRepository::new();
    let organization_id = Uuid::new_v4();
    let organization = Scope::Organization(organization_id);
    let owner = Uuid::new_v4();
    let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    repository.insert_organization(organization_id).await;
    repository.insert_user(owner, true).await;
    for user in users {
        repository.insert_user(user, true).await;
    }
    repository.insert_assignment(owner, organization, OWNER).await;
    repository
        .insert_assignment(users[1], organization, MEMBER)
        .await;

    let requests = vec![
        ChangeRequest::add(users[0], organization, MEMBER),
        ChangeRequest::change_role(users[1], organization, ADMIN),
        ChangeRequest::add(users[2], organization, MEMBER),
    ];
    let mut snapshot_request = SnapshotRequest::for_actor(owner);
    for request in &requests {
        snapshot_request.include(&request.identity_key());
    }
    let snapshot = repository.snapshot(&snapshot_request).await.unwrap();
    let engine = PermissionChangeEngine::default();
    let evaluation = engine.evaluate(
        engine.normalize(&requests).unwrap(),
        &snapshot,
        &Actor::new(owner, false),
        &[],
    );
    assert_eq!(evaluation.plan.len(), 3);

    // 計画の作成後に別の操作で2件目の対象が脱退する
    repository.remove_assignment(users[1], organization).await;

    let report = repository.apply(&evaluation.plan, mode).await.unwrap();
    (repository, organization, users, report)
}

#[tokio::test]
async fn test_best_effort_apply_isolates_failed_mutation() {
    let (repository, organization, users, report) =
        plan_with_concurrent_change(ApplyMode::BestEffort).await;

    let applied: Vec<Uuid> = report.applied.iter().map(|m| m.key.user_id).collect();
    assert_eq!(applied, vec![users[0], users[2]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].mutation.key.user_id, users[1]);
    assert_eq!(report.failed[0].error_kind, ErrorKind::PreconditionFailed);
    assert_eq!(repository.role_of(users[0], organization).await, Some(MEMBER));
    assert_eq!(repository.role_of(users[1], organization).await, None);
    assert_eq!(repository.role_of(users[2], organization).await, Some(MEMBER));
}

#[tokio::test]
async fn test_atomic_apply_rolls_back_whole_plan() {
    let (repository, organization, users, report) =
        plan_with_concurrent_change(ApplyMode::Atomic).await;

    assert!(report.applied.is_empty());
    let kinds: Vec<(Uuid, ErrorKind)> = report
        .failed
        .iter()
        .map(|failure| (failure.mutation.key.user_id, failure.error_kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (users[0], ErrorKind::RolledBack),
            (users[1], ErrorKind::PreconditionFailed),
            (users[2], ErrorKind::RolledBack),
        ]
    );
    assert_eq!(repository.role_of(users[0], organization).await, None);
    assert_eq!(repository.role_of(users[2], organization).await, None);
}

#[tokio::test]
async fn test_best_effort_handover_keeps_owner_when_successor_grant_fails() {
    common::init_test_env();
    let repository = InMemoryMembershipRepository::new();
    let organization_id = Uuid::new_v4();
    let organization = Scope::Organization(organization_id);
    let owner = Uuid::new_v4();
    let successor = Uuid::new_v4();
    repository.insert_organization(organization_id).await;
    repository.insert_user(owner, true).await;
    repository.insert_user(successor, true).await;
    repository.insert_assignment(owner, organization, OWNER).await;

    let requests = vec![
        ChangeRequest::add(successor, organization, OWNER),
        ChangeRequest::remove(owner, organization),
    ];
    let mut snapshot_request = SnapshotRequest::for_actor(owner);
    for request in &requests {
        snapshot_request.include(&request.identity_key());
    }
    let snapshot = repository.snapshot(&snapshot_request).await.unwrap();
    let engine = PermissionChangeEngine::default();
    let evaluation = engine.evaluate(
        engine.normalize(&requests).unwrap(),
        &snapshot,
        &Actor::new(owner, false),
        &[],
    );
    assert_eq!(evaluation.unresolved_blocking_count(), 0);

    // 計画の作成後に後継者が別の操作で MEMBER になる
    repository
        .insert_assignment(successor, organization, MEMBER)
        .await;

    let report = repository
        .apply(&evaluation.plan, ApplyMode::BestEffort)
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    let failed: Vec<(Uuid, ErrorKind)> = report
        .failed
        .iter()
        .map(|failure| (failure.mutation.key.user_id, failure.error_kind))
        .collect();
    assert_eq!(
        failed,
        vec![
            (successor, ErrorKind::PreconditionFailed),
            (owner, ErrorKind::PreconditionFailed),
        ]
    );
    assert_eq!(repository.role_of(owner, organization).await, Some(OWNER));
    assert_eq!(
        repository.role_of(successor, organization).await,
        Some(MEMBER)
    );
}
