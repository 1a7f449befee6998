// tests/integration/permission_changes/auto_resolve_tests.rs

use super::AUTO_RESOLVE;
use crate::common::app_helper::{setup_world, DEVELOPER, MEMBER};
use crate::common::request::{add_change, decision, json_request, send};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_auto_resolve_detects_stale_conflict_list() {
    let world = setup_world().await;
    let mutations = vec![add_change(world.outsider, world.project(), DEVELOPER)];

    let (status, response) = send(
        &world.app,
        json_request(
            "POST",
            AUTO_RESOLVE,
            world.owner,
            &json!({ "mutations": mutations, "conflicts": [] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Conflicts resolved");
    assert_eq!(response["data"]["stale_conflicts"], true);
    let recomputed = response["data"]["conflicts"].clone();
    assert_eq!(recomputed.as_array().unwrap().len(), 1);

    // 再計算された競合をそのまま送り返すと最新とみなされる
    let (status, response) = send(
        &world.app,
        json_request(
            "POST",
            AUTO_RESOLVE,
            world.owner,
            &json!({ "mutations": mutations, "conflicts": recomputed }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["stale_conflicts"], false);
}

#[tokio::test]
async fn test_auto_resolve_applies_caller_decisions() {
    let world = setup_world().await;
    let mutations = vec![
        add_change(world.outsider, world.project(), DEVELOPER),
        add_change(world.inactive, world.organization(), MEMBER),
    ];
    let decisions = vec![decision(world.outsider, world.project(), "ACCEPT")];

    let (status, response) = send(
        &world.app,
        json_request(
            "POST",
            AUTO_RESOLVE,
            world.owner,
            &json!({ "mutations": mutations, "caller_decisions": decisions }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response["data"];
    assert_eq!(data["valid"], true);
    assert!(data["remaining_conflicts"].as_array().unwrap().is_empty());
    let resolutions: Vec<&str> = data["analysis"]["resolved_conflicts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|conflict| conflict["resolution"].as_str().unwrap())
        .collect();
    assert!(resolutions.contains(&"CONFIRMED_BY_CALLER"));
    assert!(resolutions.contains(&"AUTO_DROPPED"));
    // 無効化されたユーザーへの付与は取り下げられる
    let skipped = data["analysis"]["skipped_mutations"].as_array().unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["user_id"], json!(world.inactive));
}
