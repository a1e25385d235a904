//! Router tests against an in-memory SQLite store.

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use dynasty_core::{
  dynasty::{MemberRole, NewDynasty},
  identity::Profile,
  store::DynastyStore,
};
use dynasty_store_sqlite::SqliteStore;
use futures_util::StreamExt as _;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{ApiConfig, api_router, identity::USER_ID_HEADER};

async fn setup() -> (Arc<SqliteStore>, Router) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let config = ApiConfig { base_url: "https://dynasty.example".into(), ..ApiConfig::default() };
  let router = api_router(Arc::clone(&store), config);
  (store, router)
}

async fn send(
  router: &Router,
  method: &str,
  uri: &str,
  user: Option<Uuid>,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(user) = user {
    builder = builder.header(USER_ID_HEADER, user.to_string());
  }
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  router.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Reads server-sent events off a response body.
struct EventReader {
  body:    axum::body::BodyDataStream,
  pending: String,
}

impl EventReader {
  fn new(resp: Response) -> Self {
    Self { body: resp.into_body().into_data_stream(), pending: String::new() }
  }

  /// The data of the next `state` event, parsed as JSON.
  async fn next_state(&mut self) -> Value {
    loop {
      if let Some(end) = self.pending.find("\n\n") {
        let block: String = self.pending.drain(..end + 2).collect();
        let field = |name: &str| {
          block
            .lines()
            .find_map(|l| l.strip_prefix(name).map(str::trim_start))
            .map(str::to_owned)
        };
        if field("event:").as_deref() != Some("state") {
          continue;
        }
        let data = field("data:").expect("state event without data");
        return serde_json::from_str(&data).unwrap();
      }
      let chunk = tokio::time::timeout(Duration::from_secs(5), self.body.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
        .unwrap();
      self.pending.push_str(std::str::from_utf8(&chunk).unwrap());
    }
  }

  /// Skip `state` events until one satisfies `pred`.
  async fn state_where(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
      let state = self.next_state().await;
      if pred(&state) {
        return state;
      }
    }
  }
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ─── Dynasties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_list_is_empty() {
  let (_, router) = setup().await;
  let resp = send(&router, "GET", "/dynasties", None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!([]));
}

#[tokio::test]
async fn anonymous_create_is_unauthorized_and_writes_nothing() {
  let (store, router) = setup().await;
  let resp = send(&router, "POST", "/dynasties", None, Some(json!({ "name": "Garcia" }))).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(json_body(resp).await["error"].is_string());

  let anyone = Uuid::new_v4();
  assert!(store.dynasties_founded_by(anyone).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_name_is_bad_request() {
  let (_, router) = setup().await;
  let resp = send(
    &router,
    "POST",
    "/dynasties",
    Some(Uuid::new_v4()),
    Some(json!({ "name": "   " })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_then_list_smiths() {
  let (store, router) = setup().await;
  let u1 = Uuid::new_v4();
  let mut profile = Profile::new(u1);
  profile.full_name = Some("Ada Smith".into());
  store.upsert_profile(profile).await.unwrap();

  let resp = send(&router, "POST", "/dynasties", Some(u1), Some(json!({ "name": "Smiths" }))).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let created = json_body(resp).await;
  assert_eq!(created["name"], "Smiths");
  assert_eq!(created["status"], "active");
  assert_eq!(created["founder_id"], u1.to_string());

  let resp = send(&router, "GET", "/dynasties", Some(u1), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let list = json_body(resp).await;
  let list = list.as_array().unwrap();
  assert_eq!(list.len(), 1);
  assert_eq!(list[0]["id"], created["id"]);
  assert_eq!(list[0]["created_at"], created["created_at"]);
  assert_eq!(list[0]["member_count"], 1);
  assert_eq!(list[0]["founder"]["full_name"], "Ada Smith");
}

#[tokio::test]
async fn get_unknown_dynasty_is_404() {
  let (_, router) = setup().await;
  let resp = send(&router, "GET", &format!("/dynasties/{}", Uuid::new_v4()), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let resp = send(&router, "GET", &format!("/dynasties/{}/members", Uuid::new_v4()), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn members_are_listed_oldest_first() {
  let (store, router) = setup().await;
  let u1 = Uuid::new_v4();
  let u2 = Uuid::new_v4();
  let d = store.create_dynasty(u1, NewDynasty::new("Smiths", None)).await.unwrap();
  store.add_member(d.id, u2, MemberRole::Member).await.unwrap();

  let resp = send(&router, "GET", &format!("/dynasties/{}/members", d.id), None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let members = json_body(resp).await;
  let members = members.as_array().unwrap();
  assert_eq!(members.len(), 2);
  assert_eq!(members[0]["user_id"], u1.to_string());
  assert_eq!(members[0]["role"], "founder");
  assert_eq!(members[1]["role"], "member");
}

#[tokio::test]
async fn malformed_user_header_is_bad_request() {
  let (_, router) = setup().await;
  let req = Request::builder()
    .uri("/dynasties")
    .header(USER_ID_HEADER, "not-a-uuid")
    .body(Body::empty())
    .unwrap();
  let resp = router.oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn anonymous_stream_is_unauthorized() {
  let (_, router) = setup().await;
  let resp = send(&router, "GET", "/dynasties/stream", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stream_is_event_stream() {
  let (_, router) = setup().await;
  let resp = send(&router, "GET", "/dynasties/stream", Some(Uuid::new_v4()), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
  assert_eq!(content_type, "text/event-stream");
}

#[tokio::test]
async fn stream_pushes_state_on_every_change() {
  let (store, router) = setup().await;
  let u1 = Uuid::new_v4();
  let d = store.create_dynasty(u1, NewDynasty::new("Smiths", None)).await.unwrap();

  let resp = send(&router, "GET", "/dynasties/stream", Some(u1), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let mut events = EventReader::new(resp);

  let first = events.state_where(|s| s["loading"] == false).await;
  assert_eq!(first["error"], Value::Null);
  let views = first["dynasties"].as_array().unwrap();
  assert_eq!(views.len(), 1);
  assert_eq!(views[0]["id"], d.id.to_string());
  assert_eq!(views[0]["member_count"], 1);

  store.add_member(d.id, Uuid::new_v4(), MemberRole::Member).await.unwrap();
  let next = events
    .state_where(|s| s["loading"] == false && s["dynasties"][0]["member_count"] == 2)
    .await;
  assert_eq!(next["dynasties"].as_array().unwrap().len(), 1);
}

// ─── Invites ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invite_round_trip_over_http() {
  let (store, router) = setup().await;
  let u1 = Uuid::new_v4();
  let u2 = Uuid::new_v4();
  let d = store.create_dynasty(u1, NewDynasty::new("Smiths", None)).await.unwrap();

  let resp = send(
    &router,
    "POST",
    &format!("/dynasties/{}/invites", d.id),
    Some(u1),
    Some(json!({ "email": "kin@example.org" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let issued = json_body(resp).await;
  let token = issued["token"].as_str().unwrap().to_owned();
  assert!(token.starts_with("INV_"));
  assert_eq!(issued["url"], format!("https://dynasty.example/invite/{token}"));
  assert!(issued["whatsapp_url"].as_str().unwrap().starts_with("https://wa.me/?text="));
  assert!(issued["mailto_url"].as_str().unwrap().starts_with("mailto:?subject="));
  assert!(issued["invite"].get("token_hash").is_none());

  let resp = send(&router, "POST", &format!("/invites/{token}/accept"), Some(u2), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["dynasty_id"], d.id.to_string());

  let resp = send(&router, "POST", &format!("/invites/{token}/accept"), Some(Uuid::new_v4()), None).await;
  assert_eq!(resp.status(), StatusCode::GONE);
}

#[tokio::test]
async fn non_member_cannot_invite() {
  let (store, router) = setup().await;
  let d = store
    .create_dynasty(Uuid::new_v4(), NewDynasty::new("Smiths", None))
    .await
    .unwrap();
  let resp = send(
    &router,
    "POST",
    &format!("/dynasties/{}/invites", d.id),
    Some(Uuid::new_v4()),
    Some(json!({})),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn accepting_unknown_invite_is_404() {
  let (_, router) = setup().await;
  let resp = send(&router, "POST", "/invites/INV_nope/accept", Some(Uuid::new_v4()), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn joining_twice_is_conflict() {
  let (store, router) = setup().await;
  let u1 = Uuid::new_v4();
  let d = store.create_dynasty(u1, NewDynasty::new("Smiths", None)).await.unwrap();

  let resp = send(&router, "POST", &format!("/dynasties/{}/invites", d.id), Some(u1), Some(json!({}))).await;
  let token = json_body(resp).await["token"].as_str().unwrap().to_owned();

  let resp = send(&router, "POST", &format!("/invites/{token}/accept"), Some(u1), None).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
}

// ─── Profiles & plans ────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get_own_profile() {
  let (_, router) = setup().await;
  let me = Uuid::new_v4();

  let resp = send(
    &router,
    "PUT",
    "/profiles/me",
    Some(me),
    Some(json!({ "username": "ada", "full_name": "Ada Smith" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["id"], me.to_string());

  let resp = send(&router, "GET", &format!("/profiles/{me}"), None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let profile = json_body(resp).await;
  assert_eq!(profile["username"], "ada");
  assert_eq!(profile["full_name"], "Ada Smith");
}

#[tokio::test]
async fn anonymous_profile_update_is_unauthorized() {
  let (_, router) = setup().await;
  let resp = send(&router, "PUT", "/profiles/me", None, Some(json!({ "bio": "x" }))).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn plan_catalog_is_served() {
  let (_, router) = setup().await;
  let resp = send(&router, "GET", "/plans", None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let plans = json_body(resp).await;
  let kinds: Vec<_> = plans.as_array().unwrap().iter().map(|p| p["kind"].clone()).collect();
  assert_eq!(kinds, vec![json!("basic"), json!("premium"), json!("dynasty_founder")]);
  assert_eq!(plans[0]["price_cents"], 500);
}
