//! Free-text shopping query → [`SearchIntent`].
//!
//! The parser is total: every input, including the empty string, yields an
//! intent. Extraction runs over the lower-cased, whitespace-collapsed query
//! in a fixed order (location, price, quality, urgency, occasion, colour,
//! flower type). Each extractor claims the span it matched so that later
//! extractors cannot reuse the same characters; `quận 1` is never read as a
//! price and a bare `hồng` is a rose rather than the colour pink.
//!
//! Whatever no extractor claimed, minus connective stop words, is returned
//! as [`SearchIntent::terms`] for lexical and semantic ranking.

mod price;
mod vocab;

use std::ops::Range;

use petal_core::intent::{Color, FlowerType, SearchIntent};
use regex::{Captures, Regex};

use crate::price::Bound;

/// Parse a free-text query into a structured intent.
pub fn parse(query: &str) -> SearchIntent {
  let mut scan = Scanner::new(query);
  let mut intent = SearchIntent::default();

  intent.location = scan.location();
  scan.price(&mut intent);
  intent.quality = scan.first_of(&vocab::QUALITY);
  intent.urgent = scan
    .claim(vocab::URGENCY.as_ref(), |_| Some(()))
    .is_some();
  intent.occasion = scan.first_of(&vocab::OCCASIONS);
  intent.color = scan.first_of(&vocab::COLORS);
  intent.flower_type = scan.first_of(&vocab::FLOWERS);
  intent.terms = scan.residual_terms();
  intent
}

/// Collapse whitespace and lower-case.
pub fn normalize(query: &str) -> String {
  query
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Whether `text` names `color` in any spelling the parser recognises.
pub fn mentions_color(text: &str, color: Color) -> bool { mentions(&vocab::COLORS, text, color) }

/// Whether `text` names `flower` in any spelling the parser recognises.
pub fn mentions_flower(text: &str, flower: FlowerType) -> bool {
  mentions(&vocab::FLOWERS, text, flower)
}

fn mentions<T: Copy + PartialEq>(table: &[(Regex, T)], text: &str, wanted: T) -> bool {
  let text = normalize(text);
  table
    .iter()
    .any(|(re, value)| *value == wanted && re.is_match(&text))
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

struct Scanner {
  text:  String,
  taken: Vec<Range<usize>>,
}

impl Scanner {
  fn new(query: &str) -> Self {
    Self {
      text:  normalize(query),
      taken: Vec::new(),
    }
  }

  /// Claim the first match of `re` that is free and that `accept` turns into
  /// a value. Rejected matches leave their span unclaimed.
  fn claim<T>(
    &mut self,
    re: Option<&Regex>,
    accept: impl Fn(&Captures<'_>) -> Option<T>,
  ) -> Option<T> {
    let re = re?;
    for caps in re.captures_iter(&self.text) {
      let Some(whole) = caps.get(0) else { continue };
      let span = whole.start()..whole.end();
      if span.is_empty() || overlaps(&self.taken, &span) {
        continue;
      }
      if let Some(value) = accept(&caps) {
        self.taken.push(span);
        return Some(value);
      }
    }
    None
  }

  /// The value of the first table entry whose pattern has a free match.
  fn first_of<T: Copy>(&mut self, table: &[(Regex, T)]) -> Option<T> {
    table
      .iter()
      .find_map(|(re, value)| self.claim(Some(re), |_| Some(*value)))
  }

  fn location(&mut self) -> Option<String> {
    let numbered = self.claim(vocab::NUMBERED_DISTRICT.as_ref(), |caps| {
      let n: u8 = caps.get(1)?.as_str().parse().ok()?;
      (1..=vocab::MAX_DISTRICT)
        .contains(&n)
        .then(|| format!("district_{n}"))
    });
    numbered.or_else(|| {
      self
        .first_of(&vocab::NAMED_DISTRICTS)
        .map(str::to_owned)
    })
  }

  fn price(&mut self, intent: &mut SearchIntent) {
    if let Some((lo, hi)) = self.claim(price::RANGE.as_ref(), price::range_bounds) {
      intent.price_min = Some(lo);
      intent.price_max = Some(hi);
      return;
    }
    while let Some((bound, value)) = self.claim(price::BOUNDED.as_ref(), price::bounded_value) {
      match bound {
        Bound::Upper if intent.price_max.is_none() => intent.price_max = Some(value),
        Bound::Lower if intent.price_min.is_none() => intent.price_min = Some(value),
        _ => {}
      }
    }
    if intent.price_min.is_none()
      && intent.price_max.is_none()
      && let Some(value) = self.claim(price::SINGLE.as_ref(), price::single_value)
    {
      intent.price_max = Some(value);
    }
  }

  fn residual_terms(&self) -> Vec<String> {
    let mut residual = self.text.clone();
    for span in &self.taken {
      // Spans come from regex matches and so sit on char boundaries.
      residual.replace_range(span.clone(), &" ".repeat(span.len()));
    }
    residual
      .split_whitespace()
      .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
      .filter(|w| !w.is_empty() && !vocab::STOPWORDS.contains(w))
      .map(str::to_owned)
      .collect()
  }
}

fn overlaps(taken: &[Range<usize>], span: &Range<usize>) -> bool {
  taken
    .iter()
    .any(|t| t.start < span.end && span.start < t.end)
}
