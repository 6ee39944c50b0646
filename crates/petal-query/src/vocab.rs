//! Fixed vocabularies, one compiled pattern per canonical value.
//!
//! Patterns run against lower-cased input. Each table is tried in order and
//! the first unclaimed match wins, so more specific patterns come first.

use std::sync::LazyLock;

use petal_core::intent::{Color, FlowerType, Occasion, Quality};
use regex::Regex;

fn compile<T: Copy>(table: &[(&str, T)]) -> Vec<(Regex, T)> {
  table
    .iter()
    .filter_map(|(pattern, value)| Regex::new(pattern).ok().map(|re| (re, *value)))
    .collect()
}

/// `quận 3`, `q.3`, `q3`, `district 3`.
pub static NUMBERED_DISTRICT: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"\b(?:quận|quan|district|q\.?)\s*([0-9]{1,2})\b").ok()
});

pub static NAMED_DISTRICTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
  compile(&[
    (r"tân\s*bình|\btan\s*binh\b", "tan_binh"),
    (r"bình\s*thạnh|\bbinh\s*thanh\b", "binh_thanh"),
    (r"bình\s*tân|\bbinh\s*tan\b", "binh_tan"),
    (r"phú\s*nhuận|\bphu\s*nhuan\b", "phu_nhuan"),
    (r"gò\s*vấp|\bgo\s*vap\b", "go_vap"),
    (r"thủ\s*đức|\bthu\s*duc\b", "thu_duc"),
    (r"tân\s*phú|\btan\s*phu\b", "tan_phu"),
    (r"nhà\s*bè|\bnha\s*be\b", "nha_be"),
  ])
});

/// Highest numbered district the shop delivers to.
pub const MAX_DISTRICT: u8 = 12;

pub static OCCASIONS: LazyLock<Vec<(Regex, Occasion)>> = LazyLock::new(|| {
  compile(&[
    (r"sinh\s*nhật|\bsinh\s*nhat\b|birthday", Occasion::Birthday),
    (r"khai\s*trương|\bkhai\s*truong\b|grand\s*opening|\bopening\b", Occasion::GrandOpening),
    (r"valentine|lễ\s*tình\s*nhân|\b14/2\b", Occasion::Valentine),
    (r"tình\s*yêu|\btinh\s*yeu\b|người\s*yêu|lãng\s*mạn|romantic|romance", Occasion::Romance),
    (r"đám\s*cưới|cưới|wedding", Occasion::Wedding),
    (r"chia\s*buồn|\bchia\s*buon\b|tang\s*lễ|đám\s*tang|sympathy|funeral", Occasion::Sympathy),
    (r"tốt\s*nghiệp|\btot\s*nghiep\b|graduation", Occasion::Graduation),
    (r"\b8/3\b|\b8-3\b|quốc\s*tế\s*phụ\s*nữ|phụ\s*nữ|women'?s\s*day", Occasion::WomensDay),
    (r"kỷ\s*niệm|\bky\s*niem\b|anniversary", Occasion::Anniversary),
  ])
});

/// Colours run before flower types: a bare `hồng` is a rose, only
/// `màu hồng` / `hồng phấn` / `pink` is the colour.
pub static COLORS: LazyLock<Vec<(Regex, Color)>> = LazyLock::new(|| {
  compile(&[
    (r"(?:màu\s*)?\bđỏ\b|\bred\b", Color::Red),
    (r"(?:màu\s*)?trắng|\bwhite\b", Color::White),
    (r"màu\s*hồng|hồng\s*phấn|\bpink\b", Color::Pink),
    (r"(?:màu\s*)?\bvàng\b|\byellow\b", Color::Yellow),
    (r"(?:màu\s*)?\btím\b|\bpurple\b", Color::Purple),
    (r"(?:màu\s*)?\bcam\b|\borange\b", Color::Orange),
    (r"(?:màu\s*)?xanh\s*(?:dương|biển)|\bblue\b", Color::Blue),
  ])
});

pub static FLOWERS: LazyLock<Vec<(Regex, FlowerType)>> = LazyLock::new(|| {
  compile(&[
    (r"\bhồng\b|\broses?\b", FlowerType::Roses),
    (r"\btulips?\b", FlowerType::Tulip),
    (r"phong\s*lan|\blan\b|\borchids?\b", FlowerType::Orchid),
    (r"hướng\s*dương|\bhuong\s*duong\b|\bsunflowers?\b", FlowerType::Sunflower),
    (r"\bly\b|\blil(?:y|ies)\b", FlowerType::Lily),
    (r"\bcúc\b|\bdais(?:y|ies)\b", FlowerType::Daisy),
    (r"cẩm\s*tú\s*cầu|\bhydrangeas?\b", FlowerType::Hydrangea),
    (r"cẩm\s*chướng|\bcarnations?\b", FlowerType::Carnation),
  ])
});

pub static URGENCY: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"\bgấp\b|\burgent\b|\btoday\b|hôm\s*nay|\bngay\b|\bnhanh\b|\bexpress\b|giao\s*liền")
    .ok()
});

/// Budget runs first so `giá rẻ` is not left behind as a stray `giá`.
pub static QUALITY: LazyLock<Vec<(Regex, Quality)>> = LazyLock::new(|| {
  compile(&[
    (r"giá\s*rẻ|\brẻ\b|\bcheap\b|tiết\s*kiệm|bình\s*dân|\bbudget\b", Quality::Budget),
    (r"cao\s*cấp|\bpremium\b|\bluxury\b|sang\s*trọng|\bsang\b|\bđẹp\b", Quality::Premium),
  ])
});

/// Connective and generic words that carry no retrieval signal.
pub const STOPWORDS: &[&str] = &[
  "hoa", "bó", "giỏ", "lẵng", "cho", "tặng", "giao", "ở", "tại", "và", "với", "mua", "cần", "muốn",
  "flower", "flowers", "bouquet", "for", "the", "a", "an", "to", "in", "at", "of", "with", "and",
];
