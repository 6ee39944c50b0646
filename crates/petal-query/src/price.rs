//! Price expressions: `500k`, `1.5tr`, `giá 500.000đ`, `300k - 500k`,
//! `dưới 1 triệu`, `từ 200k`.
//!
//! A bare number with neither a unit nor a `giá` prefix is not a price;
//! `10 bông` stays free text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

const NUM: &str = r"([0-9]+(?:[.,][0-9]+)*)";
const UNIT: &str = r"(triệu|trieu|tr|nghìn|nghin|ngàn|ngan|k|đồng|dong|vnd|đ)?";

/// `300k - 500k`, `từ 300 đến 500k`, `giá 300-500 nghìn`.
pub static RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(giá|gia)?\s*(?:từ|tu)?\s*{NUM}\s*{UNIT}\s*(?:-|–|đến|den|tới|toi|to)\s*{NUM}\s*{UNIT}\b"
  ))
  .ok()
});

/// `dưới 500k`, `trên 1tr`, `từ 200k`.
pub static BOUNDED: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(&format!(
    r"\b(dưới|duoi|under|below|tối\s*đa|toi\s*da|max|trên|tren|over|above|từ|tu|min|tối\s*thiểu)\s*(?:giá\s*)?{NUM}\s*{UNIT}\b"
  ))
  .ok()
});

/// `giá 500k`, `500k`, `500.000đ`.
pub static SINGLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(&format!(r"(giá|gia)?\s*{NUM}\s*{UNIT}\b")).ok()
});

/// Which side of the price a bounded expression constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
  Upper,
  Lower,
}

impl Bound {
  pub fn of(keyword: &str) -> Self {
    let keyword = keyword.trim();
    if keyword.starts_with("trên")
      || keyword.starts_with("tren")
      || keyword.starts_with("over")
      || keyword.starts_with("above")
      || keyword.starts_with("từ")
      || keyword.starts_with("tu")
      || keyword.starts_with("min")
      || keyword.starts_with("tối thiểu")
    {
      Self::Lower
    } else {
      Self::Upper
    }
  }
}

fn multiplier(unit: &str) -> Option<i64> {
  match unit {
    "k" | "nghìn" | "nghin" | "ngàn" | "ngan" => Some(1_000),
    "tr" | "triệu" | "trieu" => Some(1_000_000),
    "đ" | "đồng" | "dong" | "vnd" => Some(1),
    _ => None,
  }
}

/// Convert a matched number and unit to whole đồng.
///
/// `500.000` and `1,200,000` are digit-grouped integers; `1.5` is a decimal.
/// Anything that overflows or rounds to zero is rejected.
pub fn amount(number: &str, unit: Option<&str>) -> Option<i64> {
  let factor = match unit {
    Some(u) => multiplier(u)?,
    None => 1,
  };
  let mut groups = number.split(['.', ',']);
  let head = groups.next()?;
  let tail: Vec<&str> = groups.collect();

  let value = if tail.is_empty() || tail.iter().all(|g| g.len() == 3) {
    let digits: String = std::iter::once(head).chain(tail.iter().copied()).collect();
    digits.parse::<i64>().ok()?.checked_mul(factor)?
  } else if tail.len() == 1 {
    let decimal: f64 = format!("{head}.{}", tail[0]).parse().ok()?;
    let scaled = (decimal * factor as f64).round();
    if !scaled.is_finite() || scaled >= i64::MAX as f64 {
      return None;
    }
    scaled as i64
  } else {
    return None;
  };
  (value > 0).then_some(value)
}

fn unit_of<'t>(caps: &Captures<'t>, i: usize) -> Option<&'t str> {
  caps.get(i).map(|m| m.as_str())
}

/// Bounds from a [`RANGE`] match. One unit carries over to the other side
/// (`300-500k`). Needs a unit or a `giá` prefix.
pub fn range_bounds(caps: &Captures<'_>) -> Option<(i64, i64)> {
  let has_price_word = caps.get(1).is_some();
  let left_unit = unit_of(caps, 3);
  let right_unit = unit_of(caps, 5);
  if left_unit.is_none() && right_unit.is_none() && !has_price_word {
    return None;
  }
  let lo = amount(caps.get(2)?.as_str(), left_unit.or(right_unit))?;
  let hi = amount(caps.get(4)?.as_str(), right_unit.or(left_unit))?;
  Some((lo.min(hi), lo.max(hi)))
}

/// Value from a [`BOUNDED`] match. The keyword is enough context, so the
/// unit is optional here.
pub fn bounded_value(caps: &Captures<'_>) -> Option<(Bound, i64)> {
  let bound = Bound::of(caps.get(1)?.as_str());
  let value = amount(caps.get(2)?.as_str(), unit_of(caps, 3))?;
  Some((bound, value))
}

/// Value from a [`SINGLE`] match; a lone price is a ceiling.
pub fn single_value(caps: &Captures<'_>) -> Option<i64> {
  let unit = unit_of(caps, 3);
  if unit.is_none() && caps.get(1).is_none() {
    return None;
  }
  amount(caps.get(2)?.as_str(), unit)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn units_scale() {
    assert_eq!(amount("500", Some("k")), Some(500_000));
    assert_eq!(amount("2", Some("triệu")), Some(2_000_000));
    assert_eq!(amount("1.5", Some("tr")), Some(1_500_000));
    assert_eq!(amount("500.000", Some("đ")), Some(500_000));
    assert_eq!(amount("1,200,000", None), Some(1_200_000));
  }

  #[test]
  fn garbage_amounts_are_rejected() {
    assert_eq!(amount("0", Some("k")), None);
    assert_eq!(amount("99999999999999999999", Some("k")), None);
    assert_eq!(amount("9223372036854775807", Some("k")), None);
    assert_eq!(amount("1.2.34", None), None);
  }

  #[test]
  fn bound_keywords() {
    assert_eq!(Bound::of("dưới"), Bound::Upper);
    assert_eq!(Bound::of("tối đa"), Bound::Upper);
    assert_eq!(Bound::of("trên"), Bound::Lower);
    assert_eq!(Bound::of("từ"), Bound::Lower);
  }
}
