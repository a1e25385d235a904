//! `GET /plans` — the static pricing catalog.

use axum::Json;
use dynasty_core::plan::Plan;

pub async fn list() -> Json<[Plan; 3]> { Json(Plan::catalog()) }
