// tests/integration/permission_changes/execute_tests.rs

use super::{BULK, CSV};
use crate::common::app_helper::{setup_world, ADMIN, DEVELOPER, MEMBER, OWNER, PROJECT_MANAGER};
use crate::common::request::{
    add_change, change_role_change, changes_body, json_request, remove_change, send,
};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_bulk_changes_applies_resolved_plan() {
    let world = setup_world().await;
    let body = changes_body(vec![
        add_change(world.outsider, world.organization(), MEMBER),
        change_role_change(world.member, world.organization(), ADMIN),
        add_change(world.inactive, world.organization(), MEMBER),
        // 既に MEMBER を持つユーザーへの ADD はロール変更に変換される
        add_change(world.manager, world.organization(), ADMIN),
    ]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.owner, &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Changes applied");
    let data = &response["data"];
    assert_eq!(data["mode"], "BEST_EFFORT");
    assert_eq!(data["applied"].as_array().unwrap().len(), 3);
    assert!(data["failed"].as_array().unwrap().is_empty());
    assert_eq!(data["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(data["statistics"]["adds"], 1);
    assert_eq!(data["statistics"]["role_changes"], 2);

    let organization = world.organization();
    assert_eq!(
        world.repository.role_of(world.outsider, organization).await,
        Some(MEMBER)
    );
    assert_eq!(
        world.repository.role_of(world.member, organization).await,
        Some(ADMIN)
    );
    assert_eq!(
        world.repository.role_of(world.manager, organization).await,
        Some(ADMIN)
    );
    assert_eq!(
        world.repository.role_of(world.inactive, organization).await,
        None
    );
}

#[tokio::test]
async fn test_bulk_changes_rejects_removal_of_last_owner() {
    let world = setup_world().await;
    let body = changes_body(vec![
        remove_change(world.owner, world.organization()),
        add_change(world.outsider, world.organization(), MEMBER),
    ]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.owner, &body)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["error_type"], "unresolved_blocking_conflict");
    assert_eq!(response["details"]["unresolved_blocking_count"], 1);
    assert_eq!(
        response["details"]["conflicts"][0]["reason"],
        "LAST_OWNER_REMOVAL"
    );
    // 何も適用されない
    assert_eq!(
        world
            .repository
            .role_of(world.owner, world.organization())
            .await,
        Some(OWNER)
    );
    assert_eq!(
        world
            .repository
            .role_of(world.outsider, world.organization())
            .await,
        None
    );
}

#[tokio::test]
async fn test_bulk_changes_hands_over_ownership() {
    let world = setup_world().await;
    let body = changes_body(vec![
        remove_change(world.owner, world.organization()),
        change_role_change(world.admin, world.organization(), OWNER),
    ]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.owner, &body)).await;

    assert_eq!(status, StatusCode::OK);
    let applied = response["data"]["applied"].as_array().unwrap();
    assert_eq!(applied[0]["user_id"], json!(world.admin));
    assert_eq!(applied[1]["user_id"], json!(world.owner));
    assert_eq!(
        world
            .repository
            .role_of(world.admin, world.organization())
            .await,
        Some(OWNER)
    );
    assert_eq!(
        world
            .repository
            .role_of(world.owner, world.organization())
            .await,
        None
    );
}

#[tokio::test]
async fn test_project_manager_cannot_change_organization_membership() {
    let world = setup_world().await;
    let body = changes_body(vec![add_change(
        world.outsider,
        world.organization(),
        MEMBER,
    )]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.manager, &body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error_type"], "permission_denied");
    assert_eq!(
        world
            .repository
            .role_of(world.outsider, world.organization())
            .await,
        None
    );
}

#[tokio::test]
async fn test_project_manager_manages_own_project() {
    let world = setup_world().await;
    let body = changes_body(vec![add_change(world.member, world.project(), DEVELOPER)]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.manager, &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        world.repository.role_of(world.member, world.project()).await,
        Some(DEVELOPER)
    );
    assert_eq!(response["data"]["statistics"]["total"], 1);
}

#[tokio::test]
async fn test_csv_execute_in_atomic_mode() {
    let world = setup_world().await;
    let mut body = changes_body(vec![
        add_change(world.outsider, world.project(), DEVELOPER),
        add_change(world.outsider, world.organization(), MEMBER),
        change_role_change(world.admin, world.project(), PROJECT_MANAGER),
    ]);
    body["mode"] = json!("ATOMIC");

    let (status, response) = send(&world.app, json_request("POST", CSV, world.owner, &body)).await;

    assert_eq!(status, StatusCode::OK);
    let data = &response["data"];
    assert_eq!(data["mode"], "ATOMIC");
    assert_eq!(data["applied"].as_array().unwrap().len(), 3);
    assert_eq!(data["plan"]["steps"][0]["mutation"]["scope"]["type"], "ORGANIZATION");
    assert_eq!(
        world.repository.role_of(world.outsider, world.project()).await,
        Some(DEVELOPER)
    );
    // 組織の ADMIN にプロジェクトロールが無い場合、CHANGE_ROLE は ADD に変換される
    assert_eq!(
        world.repository.role_of(world.admin, world.project()).await,
        Some(PROJECT_MANAGER)
    );
}

#[tokio::test]
async fn test_bulk_changes_accepts_bare_change_array() {
    let world = setup_world().await;
    let body = json!([
        add_change(world.outsider, world.organization(), MEMBER),
        remove_change(world.admin, world.organization()),
    ]);

    let (status, response) = send(&world.app, json_request("POST", BULK, world.owner, &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["applied"].as_array().unwrap().len(), 2);
    assert_eq!(
        world
            .repository
            .role_of(world.outsider, world.organization())
            .await,
        Some(MEMBER)
    );
    assert_eq!(
        world
            .repository
            .role_of(world.admin, world.organization())
            .await,
        None
    );
}
