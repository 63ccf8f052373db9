use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position as read from the summary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Side {
    /// Case-insensitive scan of free text; `Short` wins when both words appear.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("short") {
            Side::Short
        } else if lower.contains("long") {
            Side::Long
        } else {
            Side::Unknown
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Side::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "Long",
            Side::Short => "Short",
            Side::Unknown => "N/A",
        }
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            Side::Long => "🟢⬆️",
            Side::Short => "🔴⬇️",
            Side::Unknown => "ℹ️",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One visible row, produced fresh on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrderRecord {
    pub id: String,
    pub symbol: Option<String>,
    pub side: Side,
    pub leverage: Option<String>,
    pub avg_price: Option<String>,
    pub open_time: Option<String>,
}

impl RawOrderRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: None,
            side: Side::Unknown,
            leverage: None,
            avg_price: None,
            open_time: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = non_empty(symbol.into());
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_leverage(mut self, leverage: impl Into<String>) -> Self {
        self.leverage = non_empty(leverage.into());
        self
    }

    pub fn with_avg_price(mut self, avg_price: impl Into<String>) -> Self {
        self.avg_price = non_empty(avg_price.into());
        self
    }

    pub fn with_open_time(mut self, open_time: impl Into<String>) -> Self {
        self.open_time = non_empty(open_time.into());
        self
    }
}

/// Trims and maps blank text to `None`.
pub fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Opened,
    Closed,
}

/// A confirmed lifecycle transition, carrying the sticky details known at that tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order_id: String,
    pub side: Side,
    pub symbol: Option<String>,
    pub leverage: Option<String>,
    pub avg_price: Option<String>,
    pub open_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_text() {
        assert_eq!(Side::from_text("SOLUSDT Perp Short 25x"), Side::Short);
        assert_eq!(Side::from_text("btcusdt LONG 10X"), Side::Long);
        assert_eq!(Side::from_text("ETHUSDT 5x"), Side::Unknown);
    }

    #[test]
    fn test_side_deserializes_legacy_empty_string() {
        let side: Side = serde_json::from_str("\"\"").unwrap();
        assert_eq!(side, Side::Unknown);
        let side: Side = serde_json::from_str("\"Short\"").unwrap();
        assert_eq!(side, Side::Short);
    }

    #[test]
    fn test_builders_drop_blank_values() {
        let record = RawOrderRecord::new("A1")
            .with_symbol("  ")
            .with_avg_price(" 101.5 ")
            .with_side(Side::Long);
        assert_eq!(record.symbol, None);
        assert_eq!(record.avg_price.as_deref(), Some("101.5"));
        assert_eq!(record.side, Side::Long);
    }
}
