//! Structured search intent extracted from a free-text query.
//!
//! The parser lives in `petal-query`; this module only defines the shape so
//! that stores and the engine can persist and act on it.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// A gifting occasion recognised in the query.
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
pub enum Occasion {
  Birthday,
  Romance,
  Valentine,
  GrandOpening,
  Sympathy,
  Wedding,
  Graduation,
  WomensDay,
  Anniversary,
}

impl Occasion {
  /// The storefront category slug that carries products for this occasion.
  pub fn category_slug(self) -> &'static str {
    match self {
      Self::Birthday => "sinh-nhat",
      Self::Romance | Self::Valentine => "tinh-yeu",
      Self::GrandOpening => "khai-truong",
      Self::Sympathy => "chia-buon",
      Self::Wedding => "cuoi",
      Self::Graduation => "tot-nghiep",
      Self::WomensDay => "8-3",
      Self::Anniversary => "ky-niem",
    }
  }
}

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
pub enum Color {
  Red,
  White,
  Pink,
  Yellow,
  Purple,
  Orange,
  Blue,
}

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
pub enum FlowerType {
  Roses,
  Tulip,
  Orchid,
  Sunflower,
  Lily,
  Daisy,
  Carnation,
  Hydrangea,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Quality {
  Premium,
  Budget,
}

/// Everything the parser recognised, plus the words it did not.
///
/// Prices are in whole đồng.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIntent {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub price_min:   Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub price_max:   Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub occasion:    Option<Occasion>,
  /// Canonical delivery-area slug, e.g. `district_1` or `tan_binh`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color:       Option<Color>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flower_type: Option<FlowerType>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub urgent:      bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub quality:     Option<Quality>,
  /// Lower-cased words not consumed by any recognised pattern, in order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub terms:       Vec<String>,
}

impl SearchIntent {
  /// Whether any hard constraint (price, occasion, location) was found.
  pub fn has_hard_filters(&self) -> bool {
    self.price_min.is_some()
      || self.price_max.is_some()
      || self.occasion.is_some()
      || self.location.is_some()
  }

  /// Whether nothing at all was recognised and no free text remains.
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// The residual free text, re-joined with single spaces.
  pub fn residual_text(&self) -> String { self.terms.join(" ") }
}
