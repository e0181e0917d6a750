//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use chrono::Duration;
use qms_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  api_router(Arc::new(store), Duration::days(7))
}

async fn send(
  app: &Router,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  let response = app
    .clone()
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap();
  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

fn new_deviation() -> Value {
  json!({
    "deviation_type": "EQUIPMENT",
    "severity": "MINOR",
    "date_of_occurrence": "2026-03-10",
    "identified_at": "2026-03-10T08:15:00Z",
    "description": "autoclave temperature excursion",
    "linkage": { "equipment_id": 12 }
  })
}

async fn create(app: &Router) -> i64 {
  let (status, body) = send(app, "POST", "/deviations", Some(new_deviation())).await;
  assert_eq!(status, StatusCode::CREATED);
  body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn create_and_fetch() {
  let app = app().await;
  let id = create(&app).await;

  let (status, body) = send(&app, "GET", &format!("/deviations/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "PENDING_DEPARTMENT_REVIEW");
  assert_eq!(body["deviation_number"], "DEV-2026-00001");

  let (status, body) = send(&app, "GET", "/deviations?status=CLOSED", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unknown_deviation_is_404() {
  let app = app().await;
  let (status, _) = send(&app, "GET", "/deviations/42", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, body) = send(
    &app,
    "POST",
    "/deviations/42/department-review/initiate",
    Some(json!({ "expected": "PENDING_DEPARTMENT_REVIEW" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn invalid_deviation_is_422() {
  let app = app().await;
  let mut body = new_deviation();
  body["linkage"] = json!({ "product_id": 3 });
  let (status, body) = send(&app, "POST", "/deviations", Some(body)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn stale_expectation_is_409() {
  let app = app().await;
  let id = create(&app).await;
  let (status, body) = send(
    &app,
    "POST",
    &format!("/deviations/{id}/qa-review/escalate"),
    Some(json!({ "expected": "DEPARTMENT_REVIEW_COMPLETED" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "concurrency_conflict");
}

#[tokio::test]
async fn full_workflow_over_http() {
  let app = app().await;
  let id = create(&app).await;
  let base = format!("/deviations/{id}");

  let (status, _) = send(
    &app,
    "POST",
    &format!("{base}/department-review/initiate"),
    Some(json!({ "expected": "PENDING_DEPARTMENT_REVIEW" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, _) = send(
    &app,
    "POST",
    &format!("{base}/department-review/complete"),
    Some(json!({ "decision": "DEPARTMENT_REVIEW_COMPLETED", "comments": "ok" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, body) = send(
    &app,
    "POST",
    &format!("{base}/cft"),
    Some(json!({
      "actor_id": 5,
      "department_id": 3,
      "cft_required": true,
      "cft_department_id": 8,
      "reviewer_id": 31
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["deviation"]["status"], "PENDING_CFT_REVIEW");
  assert_eq!(body["assignment"]["reviewer_id"], 31);

  for (path, body) in [
    ("cft-review/initiate", json!({ "expected": "PENDING_CFT_REVIEW" })),
    ("cft-review/complete", json!({ "decision": "CFT_REVIEW_COMPLETE" })),
    ("qa-review/escalate", json!({ "expected": "CFT_REVIEW_COMPLETE" })),
  ] {
    let (status, _) = send(&app, "POST", &format!("{base}/{path}"), Some(body)).await;
    assert_eq!(status, StatusCode::OK, "{path}");
  }

  let approval = json!({
    "approval_date": "2026-03-20",
    "status": "pending",
    "approver_id": 9,
    "approver_role": "QA Manager",
    "approver_name": "S. Okafor"
  });
  let (status, pending) =
    send(&app, "POST", &format!("{base}/approvals"), Some(approval)).await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, body) = send(
    &app,
    "POST",
    &format!("{base}/final-approver"),
    Some(json!({ "approval_id": pending["approval_id"], "user_id": 9 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["deviation"]["status"], "PENDING_FINAL_APPROVAL");

  let (status, body) = send(
    &app,
    "POST",
    &format!("{base}/final-approval"),
    Some(json!({
      "approval_date": "2026-03-21",
      "status": "approved",
      "approver_id": 9,
      "approver_role": "QA Manager",
      "approver_name": "S. Okafor",
      "comments": "CAPA verified"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["deviation"]["status"], "APPROVED_BY_QA");

  let (status, body) = send(
    &app,
    "POST",
    &format!("{base}/close"),
    Some(json!({ "expected": "APPROVED_BY_QA" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "CLOSED");

  let (_, history) = send(&app, "GET", &format!("{base}/history"), None).await;
  assert_eq!(history.as_array().unwrap().len(), 9);

  let (_, ledger) = send(&app, "GET", &format!("{base}/approvals/verify"), None).await;
  assert_eq!(ledger["entries"], 3);
  assert_eq!(ledger["first_broken"], Value::Null);
}

#[tokio::test]
async fn assessment_escalates_and_can_be_deleted() {
  let app = app().await;
  let id = create(&app).await;

  let (status, body) = send(
    &app,
    "POST",
    &format!("/deviations/{id}/assessments"),
    Some(json!({
      "assessment_date": "2026-03-11",
      "assessment_type": "RISK",
      "result": "low risk to product quality",
      "score": 1.5
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["deviation"]["status"], "PENDING_QA_REVIEW");
  let assessment_id = body["assessment"]["assessment_id"].as_i64().unwrap();

  let (status, _) =
    send(&app, "DELETE", &format!("/assessments/{assessment_id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) =
    send(&app, "DELETE", &format!("/assessments/{assessment_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reports_respond() {
  let app = app().await;
  create(&app).await;

  let (status, rows) = send(
    &app,
    "GET",
    "/reports/compliance?start_date=2026-03-01&end_date=2026-03-31",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(rows.as_array().unwrap().len(), 1);

  let (status, due) = send(
    &app,
    "GET",
    "/reports/reminders?as_of=2099-01-01T00:00:00Z",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(due.as_array().unwrap().len(), 1);
}
