//! Interaction events — the append-only behavioural log.
//!
//! Every event is immutable once written. Event-specific details live in a
//! typed [`EventPayload`] whose variant doubles as the `event_type`
//! discriminant stored in the database.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  feedback::{Algorithm, Context},
};

/// Longest accepted `session_id`.
pub const MAX_SESSION_ID_LEN: usize = 128;

// ─── Event type ──────────────────────────────────────────────────────────────

/// The fixed set of behaviours the log accepts.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
  View,
  AddToCart,
  RemoveFromCart,
  Purchase,
  Search,
  ClickRecommendation,
}

impl EventType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownEventType(s.to_owned()))
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// Event-specific fields. Every field is optional or defaulted so that a
/// bare `{}` metadata object is accepted for any event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "metadata", rename_all = "snake_case")]
pub enum EventPayload {
  View {
    /// The surface the product was opened from (e.g. "search", "homepage").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dwell_ms: Option<u64>,
  },
  AddToCart {
    #[serde(default = "one")]
    quantity: u32,
  },
  RemoveFromCart {
    #[serde(default = "one")]
    quantity: u32,
  },
  Purchase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_id: Option<Uuid>,
    #[serde(default = "one")]
    quantity: u32,
    /// Line total in minor currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount:   Option<i64>,
  },
  Search {
    #[serde(default)]
    query:         String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    results_count: Option<usize>,
  },
  ClickRecommendation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    impression_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context:       Option<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm:     Option<Algorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position:      Option<usize>,
  },
}

fn one() -> u32 { 1 }

impl EventPayload {
  pub fn event_type(&self) -> EventType {
    match self {
      Self::View { .. } => EventType::View,
      Self::AddToCart { .. } => EventType::AddToCart,
      Self::RemoveFromCart { .. } => EventType::RemoveFromCart,
      Self::Purchase { .. } => EventType::Purchase,
      Self::Search { .. } => EventType::Search,
      Self::ClickRecommendation { .. } => EventType::ClickRecommendation,
    }
  }

  /// A payload with every field defaulted.
  pub fn bare(event_type: EventType) -> Self {
    match event_type {
      EventType::View => Self::View { source: None, dwell_ms: None },
      EventType::AddToCart => Self::AddToCart { quantity: 1 },
      EventType::RemoveFromCart => Self::RemoveFromCart { quantity: 1 },
      EventType::Purchase => Self::Purchase {
        order_id: None,
        quantity: 1,
        amount:   None,
      },
      EventType::Search => Self::Search {
        query:         String::new(),
        results_count: None,
      },
      EventType::ClickRecommendation => Self::ClickRecommendation {
        impression_id: None,
        context:       None,
        algorithm:     None,
        position:      None,
      },
    }
  }

  /// Serialise the inner fields (without the type tag) for the `metadata`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(
      full
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({})),
    )
  }

  /// Rebuild a payload from its discriminant and metadata object.
  ///
  /// Unknown discriminants are rejected with [`Error::UnknownEventType`];
  /// metadata that does not fit the variant's shape is a validation error.
  pub fn from_parts(event_type: &str, metadata: serde_json::Value) -> Result<Self> {
    let kind = EventType::parse(event_type)?;
    let metadata = match metadata {
      serde_json::Value::Null => serde_json::json!({}),
      other => other,
    };
    let wrapped = serde_json::json!({ "event_type": kind.as_ref(), "metadata": metadata });
    serde_json::from_value(wrapped).map_err(|e| {
      Error::Validation(format!("invalid metadata for {kind} event: {e}"))
    })
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One immutable row of the interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
  pub event_id:    Uuid,
  pub user_id:     Option<String>,
  pub session_id:  String,
  pub product_id:  Option<Uuid>,
  pub category_id: Option<Uuid>,
  #[serde(flatten)]
  pub payload:     EventPayload,
  /// When the behaviour happened; stamped on receipt, not on write.
  pub created_at:  DateTime<Utc>,
}

impl InteractionEvent {
  pub fn event_type(&self) -> EventType { self.payload.event_type() }
}

/// Input to the interaction log. `event_id` and `created_at` are assigned on
/// receipt.
#[derive(Debug, Clone)]
pub struct NewInteraction {
  pub session_id:  String,
  pub user_id:     Option<String>,
  pub product_id:  Option<Uuid>,
  pub category_id: Option<Uuid>,
  pub payload:     EventPayload,
}

impl NewInteraction {
  /// Convenience constructor with a defaulted payload for `event_type`.
  pub fn new(session_id: impl Into<String>, event_type: EventType) -> Self {
    Self {
      session_id:  session_id.into(),
      user_id:     None,
      product_id:  None,
      category_id: None,
      payload:     EventPayload::bare(event_type),
    }
  }

  pub fn with_product(mut self, product_id: Uuid) -> Self {
    self.product_id = Some(product_id);
    self
  }

  pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
    self.user_id = Some(user_id.into());
    self
  }

  pub fn validate(&self) -> Result<()> {
    validate_session_id(&self.session_id)
  }

  /// Validate and stamp the event.
  pub fn into_event(self, now: DateTime<Utc>) -> Result<InteractionEvent> {
    self.validate()?;
    Ok(InteractionEvent {
      event_id:    Uuid::new_v4(),
      user_id:     self.user_id.filter(|u| !u.trim().is_empty()),
      session_id:  self.session_id,
      product_id:  self.product_id,
      category_id: self.category_id,
      payload:     self.payload,
      created_at:  now,
    })
  }
}

/// `session_id` is mandatory for every visitor, anonymous or not.
pub fn validate_session_id(session_id: &str) -> Result<()> {
  if session_id.trim().is_empty() {
    return Err(Error::Validation("session_id must not be empty".into()));
  }
  if session_id.len() > MAX_SESSION_ID_LEN {
    return Err(Error::Validation(format!(
      "session_id longer than {MAX_SESSION_ID_LEN} bytes"
    )));
  }
  Ok(())
}

/// Whose history to read: the signed-in user when known, else the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
  pub session_id: String,
  pub user_id:    Option<String>,
}
