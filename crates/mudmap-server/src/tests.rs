//! Router tests against an in-memory store.

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use mudmap_core::{
  entity::EntityKey,
  exit::ExitSuccess,
  path::RoomTarget,
  room::{RoomVisit, VisitExit},
  store::GraphStore,
  sync::{LocalReplica, Model, SyncRecord},
};
use mudmap_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::Value;
use tower::ServiceExt as _;

use crate::{
  AppState,
  auth::{AuthConfig, DEFAULT_REALM},
  router,
};

async fn make_state(password: &str) -> AppState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .unwrap()
    .to_string();

  AppState {
    store: Arc::new(store),
    auth:  Arc::new(AuthConfig::new("mapper", hash, DEFAULT_REALM).unwrap()),
  }
}

fn auth_header() -> String { format!("Basic {}", B64.encode("mapper:secret")) }

async fn send(state: &AppState<SqliteStore>, method: &str, uri: &str, body: Option<String>) -> Response {
  let mut builder = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::AUTHORIZATION, auth_header());
  if body.is_some() {
    builder = builder.header(header::CONTENT_TYPE, "application/json");
  }
  let req = builder.body(Body::from(body.unwrap_or_default())).unwrap();
  router(state.clone()).oneshot(req).await.unwrap()
}

async fn json(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn visit(n: i64, name: &str, exits: &[(&str, i64)]) -> RoomVisit {
  let mut v = RoomVisit::new(n, name);
  v.zone = Some("aylor".into());
  v.exits = exits
    .iter()
    .map(|(d, to)| VisitExit { direction: d.to_string(), to_room_number: *to })
    .collect();
  v
}

fn moved(from: i64, to: i64, cmd: &str) -> ExitSuccess {
  ExitSuccess {
    from_room:    from,
    to_room:      to,
    direction:    cmd.into(),
    move_command: cmd.into(),
    pre_commands: vec![],
  }
}

/// A small line of rooms: 1 -e-> 2 -e-> 3, with 3 also listing an
/// unexplored exit north.
async fn seed(store: &SqliteStore) {
  store.upsert_room(visit(1, "West Gate", &[])).await.unwrap();
  store.upsert_room(visit(2, "Market Street", &[])).await.unwrap();
  store.upsert_room(visit(3, "Market Square", &[("n", 99)])).await.unwrap();
  store.record_exit_success(moved(1, 2, "e")).await.unwrap();
  store.record_exit_success(moved(2, 3, "e")).await.unwrap();
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_credentials() {
  let state = make_state("secret").await;
  let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
  let resp = router(state).oneshot(req).await.unwrap();

  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await["status"], "ok");
}

#[tokio::test]
async fn missing_credentials_are_challenged() {
  let state = make_state("secret").await;
  let req = Request::builder().uri("/summary").body(Body::empty()).unwrap();
  let resp = router(state).oneshot(req).await.unwrap();

  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
  assert!(challenge.to_str().unwrap().starts_with("Basic realm=\"mudmap\""));
  assert_eq!(json(resp).await["error"], "unauthorized");
}

// ─── Replica routes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn stored_records_are_served_as_changes() {
  let state = make_state("secret").await;
  let local = SqliteStore::open_in_memory().await.unwrap();
  local.upsert_room(visit(5, "Temple", &[])).await.unwrap();

  for model in [Model::Entity, Model::Room] {
    for record in local.dirty_records(model).await.unwrap() {
      let body = serde_json::to_string(&record).unwrap();
      let resp = send(&state, "PUT", "/sync/records", Some(body)).await;
      assert_eq!(resp.status(), StatusCode::OK);
      assert_eq!(json(resp).await["outcome"], "stored");
    }
  }

  let resp = send(&state, "GET", "/sync/room", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let rooms: Vec<SyncRecord> = serde_json::from_value(json(resp).await).unwrap();
  assert_eq!(rooms.len(), 1);
  assert_eq!(rooms[0].model(), Model::Room);

  let since = chrono::Utc::now() + chrono::Duration::hours(1);
  let uri = format!("/sync/room?since={}", since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true));
  let later: Vec<SyncRecord> = serde_json::from_value(json(send(&state, "GET", &uri, None).await).await).unwrap();
  assert!(later.is_empty());
}

#[tokio::test]
async fn record_with_missing_parent_conflicts() {
  let state = make_state("secret").await;
  let local = SqliteStore::open_in_memory().await.unwrap();
  local.upsert_room(visit(5, "Temple", &[])).await.unwrap();

  let room = local.dirty_records(Model::Room).await.unwrap().remove(0);
  let resp = send(&state, "PUT", "/sync/records", Some(serde_json::to_string(&room).unwrap())).await;

  assert_eq!(resp.status(), StatusCode::CONFLICT);
  let body = json(resp).await;
  assert_eq!(body["outcome"], "unresolved");
  assert_eq!(body["missing"]["model"], "entity");
}

#[tokio::test]
async fn unknown_model_is_rejected() {
  let state = make_state("secret").await;
  let resp = send(&state, "GET", "/sync/teleporters", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Navigation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn room_lookup_and_missing_room() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/rooms/2", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await["full_name"], "Market Street");

  let resp = send(&state, "GET", "/rooms/404", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_by_number_and_name() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/path?from=1&to=3", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let route = json(resp).await;
  assert_eq!(route["path"], serde_json::json!(["e", "e"]));
  assert_eq!(route["cost"], 2);

  let resp = send(&state, "GET", "/path?from=1&to=Market%20Square", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await["cost"], 2);
}

#[tokio::test]
async fn path_failures_map_to_statuses() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/path?from=3&to=1", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert_eq!(json(resp).await["reason"]["kind"], "not_found");

  let resp = send(&state, "GET", "/path?from=1&to=Market", None).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  assert_eq!(json(resp).await["reason"]["kind"], "ambiguous");

  let resp = send(&state, "GET", "/path?from=1&to=Lighthouse", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert_eq!(json(resp).await["reason"]["kind"], "unknown_room");

  let resp = send(&state, "GET", "/path?from=1&to=3&max_depth=1", None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exit_details_or_empty_object() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/rooms/1/exits/east", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await["move_command"], "e");

  let resp = send(&state, "GET", "/rooms/1/exits/w", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await, serde_json::json!({}));
}

#[tokio::test]
async fn unexplored_rooms_in_zone() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/unexplored?zone=aylor", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let rooms = json(resp).await;
  assert_eq!(rooms.as_array().map(Vec::len), Some(1));
  assert_eq!(rooms[0]["room_number"], 3);

  let resp = send(&state, "GET", "/unexplored?zone=aylor&visited=3", None).await;
  assert_eq!(json(resp).await, serde_json::json!([]));

  let resp = send(&state, "GET", "/unexplored?zone=aylor&visited=3,x", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_counts_rooms_and_exits() {
  let state = make_state("secret").await;
  seed(&state.store).await;

  let resp = send(&state, "GET", "/summary", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let summary = json(resp).await;
  assert_eq!(summary["rooms"], 3);
  assert!(summary["exits"].as_u64().unwrap() >= 2);
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn entity_queries_over_http() {
  let state = make_state("secret").await;
  seed(&state.store).await;
  state
    .store
    .add_observation(EntityKey::room(2), "a fountain sprays here".into(), None)
    .await
    .unwrap();

  let resp = send(&state, "GET", "/nodes/search?q=Fountain", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let hits = json(resp).await;
  assert_eq!(hits.as_array().map(Vec::len), Some(1));
  assert_eq!(hits[0]["name"], "2");
  assert_eq!(hits[0]["observations"][0], "a fountain sprays here");

  let body = serde_json::json!({ "names": ["1", "3", "404"] }).to_string();
  let resp = send(&state, "POST", "/nodes/open", Some(body)).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let opened = json(resp).await;
  assert_eq!(opened.as_array().map(Vec::len), Some(2));

  let resp = send(&state, "GET", "/entities/room", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json(resp).await.as_array().map(Vec::len), Some(3));

  let resp = send(&state, "GET", "/entities/dragon", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_engine_round_trips_through_server() {
  use mudmap_sync::{HttpRemote, RemoteConfig, SyncEngine};

  let state = make_state("secret").await;
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let app = router(state.clone());
  tokio::spawn(async move { axum::serve(listener, app).await });

  let remote = HttpRemote::new(RemoteConfig {
    base_url: format!("http://{addr}"),
    username: "mapper".to_string(),
    password: "secret".to_string(),
  })
  .unwrap();

  let a = SqliteStore::open_in_memory().await.unwrap();
  seed(&a).await;
  let mut pusher = SyncEngine::new(a, remote.clone());
  let report = pusher.sync_once().await.unwrap().expect("remote reachable");
  assert_eq!(report.push.failed, 0);
  assert_eq!(report.push.unresolved, 0);

  let b = SqliteStore::open_in_memory().await.unwrap();
  let mut puller = SyncEngine::new(b, remote);
  let report = puller.sync_once().await.unwrap().expect("remote reachable");
  assert!(report.pull.complete);

  let route = puller
    .local()
    .find_path(1, RoomTarget::Number(3), 10)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(route.path, vec!["e", "e"]);
}
