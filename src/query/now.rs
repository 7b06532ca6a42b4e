//! Now-relative time expressions
//!
//! `now`, `now-1h`, `now+30m`, `now - 2d`. Units: `ms`, `s`, `m`, `h`, `d`, `w`.

use std::fmt;

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// A time bound relative to the evaluation instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NowExpr {
    /// Signed offset from now in milliseconds
    pub offset_ms: i64,
}

impl NowExpr {
    /// Parses a now expression; `None` when the string is not one
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let rest = compact.strip_prefix("now")?;
        if rest.is_empty() {
            return Some(Self { offset_ms: 0 });
        }

        let (sign, amount) = match rest.as_bytes()[0] {
            b'+' => (1, &rest[1..]),
            b'-' => (-1, &rest[1..]),
            _ => return None,
        };

        let digits_end = amount
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(amount.len());
        if digits_end == 0 {
            return None;
        }
        let n: i64 = amount[..digits_end].parse().ok()?;
        let unit = match &amount[digits_end..] {
            "ms" => 1,
            "s" => SECOND,
            "m" => MINUTE,
            "h" => HOUR,
            "d" => DAY,
            "w" => WEEK,
            _ => return None,
        };

        Some(Self {
            offset_ms: sign * n.checked_mul(unit)?,
        })
    }

    /// Whether a JSON value is a now expression
    pub fn is_now_value(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::String(s) => Self::parse(s).is_some(),
            serde_json::Value::Array(items) => items.iter().any(Self::is_now_value),
            _ => false,
        }
    }

    /// Concrete timestamp at `now_ms`
    pub fn resolve(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(self.offset_ms)
    }

    /// The instant at which this bound equals `value_ms`
    pub fn inverse(&self, value_ms: i64) -> i64 {
        value_ms.saturating_sub(self.offset_ms)
    }
}

impl fmt::Display for NowExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset_ms {
            0 => write!(f, "now"),
            n if n > 0 => write!(f, "now+{}ms", n),
            n => write!(f, "now-{}ms", -n),
        }
    }
}
