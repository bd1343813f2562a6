use std::path::PathBuf;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use lectern_core::{
  identity::{NewIdentity, Role},
  store::MarketplaceStore,
  subject::SubjectStatus,
};
use lectern_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;
use crate::gateway::LocalGateway;

type TestState = AppState<SqliteStore, LocalGateway>;

fn test_config() -> ServerConfig {
  ServerConfig {
    host:                  "127.0.0.1".to_string(),
    port:                  5000,
    store_path:            PathBuf::from(":memory:"),
    token_secret:          "test-secret".to_string(),
    token_ttl_secs:        3600,
    currency:              "usd".to_string(),
    settlement_timeout_ms: 5000,
    settlement_attempts:   3,
    admin_emails:          vec!["Root@Example.com".to_string()],
    gateway_auto_confirm:  false,
  }
}

async fn make_state() -> TestState {
  let store = SqliteStore::open_in_memory().await.unwrap();
  AppState::new(store, LocalGateway::new(), test_config()).unwrap()
}

/// Register `email` with `role` directly in the store and mint a token for it.
async fn seed(state: &TestState, email: &str, role: Role) -> String {
  state
    .store
    .upsert_identity(NewIdentity {
      email:         email.to_string(),
      role,
      name:          None,
      photo_url:     None,
      password_hash: "unused".to_string(),
    })
    .await
    .unwrap();
  state.credentials.issue(email).token
}

async fn send(
  state: &TestState,
  method: &str,
  uri: &str,
  token: Option<&str>,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  router(state.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap()
}

async fn json_body(res: Response) -> Value {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

/// An approved subject owned by a freshly seeded instructor.
async fn approved_subject(state: &TestState, price: f64, seats: u32) -> String {
  let instructor = seed(state, "teach@example.com", Role::Instructor).await;
  let admin = seed(state, "root@example.com", Role::Admin).await;

  let res = send(
    state,
    "POST",
    "/subjects",
    Some(&instructor),
    Some(json!({ "title": "Rust", "price": price, "availableSeats": seats })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::CREATED);
  let id = json_body(res).await["subjectId"].as_str().unwrap().to_string();

  let res = send(state, "PATCH", &format!("/subjects/{id}/approve"), Some(&admin), None).await;
  assert_eq!(res.status(), StatusCode::OK);
  id
}

// ── Liveness and authentication ─────────────────────────────────────────────

#[tokio::test]
async fn root_is_public() {
  let state = make_state().await;
  let res = send(&state, "GET", "/", None, None).await;
  assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_token_is_401() {
  let state = make_state().await;
  let res = send(&state, "GET", "/users", None, None).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
  let body = json_body(res).await;
  assert_eq!(body["error"], json!(true));
}

#[tokio::test]
async fn token_from_another_secret_is_401() {
  let state = make_state().await;
  seed(&state, "root@example.com", Role::Admin).await;
  let other = crate::credential::CredentialService::new(b"other", chrono::Duration::hours(1))
    .unwrap()
    .issue("root@example.com");
  let res = send(&state, "GET", "/users", Some(&other.token), None).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn huge_token_lifetime_is_a_configuration_error() {
  for secs in [1_000_000_000_000_000, u64::MAX] {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let config = ServerConfig { token_ttl_secs: secs, ..test_config() };
    assert!(matches!(
      AppState::new(store, LocalGateway::new(), config),
      Err(crate::credential::CredentialError::InvalidLifetime(_))
    ));
  }
}

#[tokio::test]
async fn login_registers_then_checks_password() {
  let state = make_state().await;

  let res = send(
    &state,
    "POST",
    "/jwt",
    None,
    Some(json!({ "email": "  Ada@Example.com ", "password": "hunter2", "name": "Ada" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::OK);
  let token = json_body(res).await["token"].as_str().unwrap().to_string();

  let res = send(&state, "GET", "/users/ada@example.com/role", Some(&token), None).await;
  assert_eq!(res.status(), StatusCode::OK);
  let body = json_body(res).await;
  assert_eq!(body["email"], "ada@example.com");
  assert_eq!(body["role"], "user");

  let res = send(
    &state,
    "POST",
    "/jwt",
    None,
    Some(json!({ "email": "ada@example.com", "password": "wrong" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn configured_admin_email_registers_as_admin() {
  let state = make_state().await;
  let res = send(
    &state,
    "POST",
    "/jwt",
    None,
    Some(json!({ "email": "root@example.com", "password": "pw" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::OK);
  let identity = state.store.get_identity("root@example.com").await.unwrap().unwrap();
  assert_eq!(identity.role, Role::Admin);
}

#[tokio::test]
async fn role_lookup_is_self_only() {
  let state = make_state().await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  seed(&state, "bob@example.com", Role::User).await;
  let res = send(&state, "GET", "/users/bob@example.com/role", Some(&ada), None).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

// ── Roles ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_role_is_403_and_changes_nothing() {
  let state = make_state().await;
  let student = seed(&state, "ada@example.com", Role::User).await;

  let res = send(
    &state,
    "POST",
    "/subjects",
    Some(&student),
    Some(json!({ "title": "Rust", "price": 50.0, "availableSeats": 30 })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
  assert!(state.store.list_subjects(None).await.unwrap().is_empty());

  let res = send(&state, "GET", "/users", Some(&student), None).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn promotion_applies_to_an_existing_token() {
  let state = make_state().await;
  let admin = seed(&state, "root@example.com", Role::Admin).await;
  let token = seed(&state, "ada@example.com", Role::User).await;
  let create = json!({ "title": "Rust", "price": 50.0, "availableSeats": 30 });

  let res = send(&state, "POST", "/subjects", Some(&token), Some(create.clone())).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);

  let res = send(
    &state,
    "PATCH",
    "/users/ada@example.com/role",
    Some(&admin),
    Some(json!({ "role": "instructor" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::OK);

  let res = send(&state, "POST", "/subjects", Some(&token), Some(create)).await;
  assert_eq!(res.status(), StatusCode::CREATED);
  let subject = json_body(res).await;
  assert_eq!(subject["status"], "pending");
  assert_eq!(subject["enrolledCount"], 0);
  assert_eq!(subject["instructorEmail"], "ada@example.com");
}

#[tokio::test]
async fn demotion_applies_to_an_existing_token() {
  let state = make_state().await;
  let token = seed(&state, "ada@example.com", Role::Instructor).await;
  state.store.set_role("ada@example.com", Role::User).await.unwrap();

  let res = send(
    &state,
    "POST",
    "/subjects",
    Some(&token),
    Some(json!({ "title": "Rust", "price": 50.0, "availableSeats": 30 })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn role_change_for_unknown_user_is_404() {
  let state = make_state().await;
  let admin = seed(&state, "root@example.com", Role::Admin).await;
  let res = send(
    &state,
    "PATCH",
    "/users/ghost@example.com/role",
    Some(&admin),
    Some(json!({ "role": "instructor" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn feedback_keeps_subject_pending() {
  let state = make_state().await;
  let instructor = seed(&state, "teach@example.com", Role::Instructor).await;
  let admin = seed(&state, "root@example.com", Role::Admin).await;

  let res = send(
    &state,
    "POST",
    "/subjects",
    Some(&instructor),
    Some(json!({ "title": "Rust", "price": 50.0, "availableSeats": 30 })),
  )
  .await;
  let id = json_body(res).await["subjectId"].as_str().unwrap().to_string();

  let res = send(
    &state,
    "PATCH",
    &format!("/subjects/{id}/feedback"),
    Some(&admin),
    Some(json!({ "feedback": "needs a syllabus" })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::OK);
  let subject = json_body(res).await;
  assert_eq!(subject["status"], "pending");
  assert_eq!(subject["feedback"], "needs a syllabus");

  let res = send(&state, "GET", "/subjects?status=pending", Some(&admin), None).await;
  assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
  let res = send(&state, "GET", "/subjects?status=approved", Some(&admin), None).await;
  assert!(json_body(res).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn negative_price_is_400() {
  let state = make_state().await;
  let instructor = seed(&state, "teach@example.com", Role::Instructor).await;
  let res = send(
    &state,
    "POST",
    "/subjects",
    Some(&instructor),
    Some(json!({ "title": "Rust", "price": -1.0, "availableSeats": 30 })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Selections ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn selections_are_private_to_their_owner() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let bob = seed(&state, "bob@example.com", Role::User).await;

  let res = send(&state, "POST", "/selections", Some(&ada), Some(json!({ "subjectId": subject_id }))).await;
  assert_eq!(res.status(), StatusCode::CREATED);
  let selection_id = json_body(res).await["selectionId"].as_str().unwrap().to_string();

  let res = send(&state, "GET", "/selections?email=ada@example.com", Some(&bob), None).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);

  let res = send(&state, "GET", "/selections", Some(&bob), None).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert!(json_body(res).await.as_array().unwrap().is_empty());

  let res = send(&state, "DELETE", &format!("/selections/{selection_id}"), Some(&bob), None).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);

  let res = send(&state, "DELETE", &format!("/selections/{selection_id}"), Some(&ada), None).await;
  assert_eq!(res.status(), StatusCode::NO_CONTENT);
  let res = send(&state, "DELETE", &format!("/selections/{selection_id}"), Some(&ada), None).await;
  assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn selecting_unknown_subject_is_404() {
  let state = make_state().await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let res = send(
    &state,
    "POST",
    "/selections",
    Some(&ada),
    Some(json!({ "subjectId": uuid::Uuid::new_v4() })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Payments ────────────────────────────────────────────────────────────────

/// Select the subject as `email`, then reserve and pay for its price.
async fn paid_selection(
  state: &TestState,
  token: &str,
  email: &str,
  subject_id: &str,
) -> Value {
  let res = send(state, "POST", "/selections", Some(token), Some(json!({ "subjectId": subject_id }))).await;
  let selection = json_body(res).await;
  let price = selection["priceSnapshot"].as_f64().unwrap();

  let res = send(state, "POST", "/payments/reservations", Some(token), Some(json!({ "price": price }))).await;
  assert_eq!(res.status(), StatusCode::OK);
  let reservation = json_body(res).await;
  let handle = reservation["reservationHandle"].as_str().unwrap();
  state.gateway.confirm(handle).await.unwrap();

  json!({
    "selectionId": selection["selectionId"],
    "subjectId": subject_id,
    "email": email,
    "amount": reservation["amount"],
    "reservationHandle": handle,
  })
}

#[tokio::test]
async fn purchase_end_to_end() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;

  let mut command = paid_selection(&state, &ada, "ada@example.com", &subject_id).await;
  assert_eq!(command["amount"], 5000);
  // Stale counters from older clients are accepted and ignored.
  command["availableSeats"] = json!(1000);
  command["enrolledCount"] = json!(0);

  let res = send(&state, "POST", "/payments", Some(&ada), Some(command.clone())).await;
  assert_eq!(res.status(), StatusCode::CREATED);
  let ack = json_body(res).await;
  assert_eq!(ack["acknowledged"], true);
  assert_eq!(ack["replayed"], false);
  assert_eq!(ack["payment"]["amount"], 5000);

  let subject = state
    .store
    .get_subject(subject_id.parse().unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(subject.available_seats, 29);
  assert_eq!(subject.enrolled_count, 1);
  assert_eq!(subject.status, SubjectStatus::Approved);

  // Client retry after a lost response.
  let res = send(&state, "POST", "/payments", Some(&ada), Some(command)).await;
  assert_eq!(res.status(), StatusCode::OK);
  let replay = json_body(res).await;
  assert_eq!(replay["replayed"], true);
  assert_eq!(replay["insertedId"], ack["insertedId"]);

  let res = send(&state, "GET", "/selections?email=ada@example.com", Some(&ada), None).await;
  assert!(json_body(res).await.as_array().unwrap().is_empty());
  let res = send(&state, "GET", "/payments?email=ada@example.com", Some(&ada), None).await;
  assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unpaid_reservation_is_402() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;

  let res = send(&state, "POST", "/selections", Some(&ada), Some(json!({ "subjectId": subject_id }))).await;
  let selection = json_body(res).await;
  let res = send(&state, "POST", "/payments/reservations", Some(&ada), Some(json!({ "price": 50.0 }))).await;
  let reservation = json_body(res).await;

  let res = send(
    &state,
    "POST",
    "/payments",
    Some(&ada),
    Some(json!({
      "selectionId": selection["selectionId"],
      "subjectId": subject_id,
      "email": "ada@example.com",
      "amount": 5000,
      "reservationHandle": reservation["reservationHandle"],
    })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn sold_out_is_409() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 20.0, 1).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let bob = seed(&state, "bob@example.com", Role::User).await;

  let first = paid_selection(&state, &ada, "ada@example.com", &subject_id).await;
  let second = paid_selection(&state, &bob, "bob@example.com", &subject_id).await;

  let res = send(&state, "POST", "/payments", Some(&ada), Some(first)).await;
  assert_eq!(res.status(), StatusCode::CREATED);
  let res = send(&state, "POST", "/payments", Some(&bob), Some(second)).await;
  assert_eq!(res.status(), StatusCode::CONFLICT);

  let res = send(&state, "GET", "/selections?email=bob@example.com", Some(&bob), None).await;
  assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn settling_for_another_email_is_403() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let bob = seed(&state, "bob@example.com", Role::User).await;

  let command = paid_selection(&state, &ada, "ada@example.com", &subject_id).await;
  let res = send(&state, "POST", "/payments", Some(&bob), Some(command)).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);

  let res = send(&state, "GET", "/payments?email=ada@example.com", Some(&bob), None).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn zero_price_reservation_is_400() {
  let state = make_state().await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let res = send(&state, "POST", "/payments/reservations", Some(&ada), Some(json!({ "price": 0 }))).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paying_less_than_the_snapshot_is_402() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;

  let res = send(&state, "POST", "/selections", Some(&ada), Some(json!({ "subjectId": subject_id }))).await;
  let selection = json_body(res).await;
  let res = send(&state, "POST", "/payments/reservations", Some(&ada), Some(json!({ "price": 0.01 }))).await;
  let reservation = json_body(res).await;
  let handle = reservation["reservationHandle"].as_str().unwrap();
  state.gateway.confirm(handle).await.unwrap();

  let res = send(
    &state,
    "POST",
    "/payments",
    Some(&ada),
    Some(json!({
      "selectionId": selection["selectionId"],
      "subjectId": subject_id,
      "email": "ada@example.com",
      "amount": 1,
      "reservationHandle": handle,
    })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);

  assert!(state.store.list_payments("ada@example.com").await.unwrap().is_empty());
  let subject = state
    .store
    .get_subject(subject_id.parse().unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(subject.available_seats, 30);
  let res = send(&state, "GET", "/selections?email=ada@example.com", Some(&ada), None).await;
  assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

// ── Unauthenticated writes ──────────────────────────────────────────────────

#[tokio::test]
async fn creating_a_subject_without_token_is_401_and_writes_nothing() {
  let state = make_state().await;
  let res = send(
    &state,
    "POST",
    "/subjects",
    None,
    Some(json!({ "title": "Rust", "price": 50.0, "availableSeats": 30 })),
  )
  .await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(state.store.list_subjects(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn selecting_without_token_is_401_and_writes_nothing() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let res = send(&state, "POST", "/selections", None, Some(json!({ "subjectId": subject_id }))).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(state.store.list_selections("ada@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn settling_without_token_is_401_and_writes_nothing() {
  let state = make_state().await;
  let subject_id = approved_subject(&state, 50.0, 30).await;
  let ada = seed(&state, "ada@example.com", Role::User).await;
  let command = paid_selection(&state, &ada, "ada@example.com", &subject_id).await;

  let res = send(&state, "POST", "/payments", None, Some(command)).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

  assert!(state.store.list_payments("ada@example.com").await.unwrap().is_empty());
  assert_eq!(state.store.list_selections("ada@example.com").await.unwrap().len(), 1);
  let subject = state
    .store
    .get_subject(subject_id.parse().unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(subject.available_seats, 30);
  assert_eq!(subject.enrolled_count, 0);
}
