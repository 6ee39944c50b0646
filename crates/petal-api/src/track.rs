//! Handler for `POST /track`, the behavioural event intake.

use std::sync::Arc;

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use petal_core::{
  embedding::Encoder,
  event::{EventPayload, NewInteraction},
};
use petal_engine::{Backend, Engine};
use serde::Deserialize;
use uuid::Uuid;

use crate::{Ack, error::ApiError};

/// JSON body accepted by `POST /track`.
///
/// `event_type` must be one of the fixed kinds (`view`, `add_to_cart`,
/// `remove_from_cart`, `purchase`, `search`, `click_recommendation`);
/// `metadata` must fit that kind's shape.
#[derive(Debug, Deserialize)]
pub struct TrackBody {
  pub session_id:  String,
  pub event_type:  String,
  #[serde(default)]
  pub user_id:     Option<String>,
  #[serde(default)]
  pub product_id:  Option<Uuid>,
  #[serde(default)]
  pub category_id: Option<Uuid>,
  #[serde(default)]
  pub metadata:    serde_json::Value,
}

/// `POST /track`
///
/// Answers once the event is queued; the write happens off the request
/// path.
pub async fn track<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  body: Result<Json<TrackBody>, JsonRejection>,
) -> Result<Json<Ack>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let Json(body) = body?;
  let payload = EventPayload::from_parts(&body.event_type, body.metadata)?;
  engine.track(NewInteraction {
    session_id: body.session_id,
    user_id: body.user_id.filter(|u| !u.trim().is_empty()),
    product_id: body.product_id,
    category_id: body.category_id,
    payload,
  })?;
  Ok(Json(Ack::ok()))
}
