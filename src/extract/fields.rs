use std::sync::LazyLock;

use regex::Regex;

use crate::config::SelectorTable;
use crate::record::{BusinessRecord, Field};

static FLOAT_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap());
static INT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+").unwrap());

pub const CATEGORY_SEPARATOR: &str = "; ";

/// How matched elements turn into a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Trimmed text of the first match.
    First,
    /// Like `First`, with newlines flattened to `, `.
    FirstJoinLines,
    /// Trimmed text of every match in document order.
    All { separator: &'static str },
    /// Attribute of the first match.
    Attr { name: &'static str },
}

/// Field table in output order, paired with the configured selector strings.
pub fn table(selectors: &SelectorTable) -> Vec<(Field, &str, Rule)> {
    vec![
        (Field::Name, selectors.name.as_str(), Rule::First),
        (
            Field::Categories,
            selectors.categories.as_str(),
            Rule::All { separator: CATEGORY_SEPARATOR },
        ),
        (Field::PriceRange, selectors.price_range.as_str(), Rule::First),
        (Field::Phone, selectors.phone.as_str(), Rule::First),
        (Field::Address, selectors.address.as_str(), Rule::FirstJoinLines),
        (Field::City, selectors.city.as_str(), Rule::First),
        (Field::State, selectors.state.as_str(), Rule::First),
        (Field::ZipCode, selectors.zip_code.as_str(), Rule::First),
        (Field::Country, selectors.country.as_str(), Rule::First),
        (Field::Rating, selectors.rating.as_str(), Rule::Attr { name: "content" }),
        (
            Field::ReviewCount,
            selectors.review_count.as_str(),
            Rule::Attr { name: "content" },
        ),
    ]
}

/// Store a resolved value on the record. Numeric fields parse leniently.
pub fn assign(record: &mut BusinessRecord, field: Field, value: String) {
    match field {
        Field::Encid => record.encid = value,
        Field::Name => record.name = value,
        Field::Categories => record.categories = value,
        Field::PriceRange => record.price_range = value,
        Field::Phone => record.phone = value,
        Field::Address => record.address = value,
        Field::City => record.city = value,
        Field::State => record.state = value,
        Field::ZipCode => record.zip_code = value,
        Field::Country => record.country = value,
        Field::Rating => record.rating = parse_float_prefix(&value),
        Field::ReviewCount => record.review_count = parse_int_prefix(&value),
        Field::Url => record.url = value,
    }
}

/// Longest leading decimal number in `s`, or 0.
pub fn parse_float_prefix(s: &str) -> f64 {
    FLOAT_PREFIX_RE
        .find(s.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Longest leading integer in `s`, or 0.
pub fn parse_int_prefix(s: &str) -> i64 {
    INT_PREFIX_RE
        .find(s.trim())
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0)
}
