use crate::types::{EventKind, OrderEvent, RawOrderRecord, Side};
use serde::{Deserialize, Deserializer, Serialize};

/// Where an order sits in its lifecycle, derived from the notification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Provisional,
    Active,
    Closed,
}

/// Persistent per-order bookkeeping.
///
/// Field names are camelCase on disk; the short names written by earlier
/// watcher versions (`seen`, `missing`, `lev`) are still accepted, as are
/// empty strings for absent values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    #[serde(default, alias = "seen")]
    pub seen_count: u32,
    #[serde(default, alias = "missing")]
    pub missing_count: u32,
    #[serde(default)]
    pub opened_notified: bool,
    #[serde(default)]
    pub closed_notified: bool,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Side,
    #[serde(default, alias = "lev", deserialize_with = "blank_as_none")]
    pub leverage: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub avg_price: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub open_time: Option<String>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(crate::types::non_empty))
}

impl OrderState {
    pub fn first_sighting(record: &RawOrderRecord) -> Self {
        let mut state = Self {
            seen_count: 1,
            ..Self::default()
        };
        state.merge_sticky(record);
        state
    }

    pub fn phase(&self) -> Phase {
        if self.closed_notified {
            Phase::Closed
        } else if self.opened_notified {
            Phase::Active
        } else {
            Phase::Provisional
        }
    }

    /// Non-empty values replace old ones; empty values never erase.
    pub fn merge_sticky(&mut self, record: &RawOrderRecord) {
        fn keep(slot: &mut Option<String>, incoming: &Option<String>) {
            if let Some(value) = incoming.as_ref().filter(|v| !v.is_empty()) {
                *slot = Some(value.clone());
            }
        }

        keep(&mut self.symbol, &record.symbol);
        keep(&mut self.leverage, &record.leverage);
        keep(&mut self.avg_price, &record.avg_price);
        keep(&mut self.open_time, &record.open_time);
        if record.side.is_known() {
            self.side = record.side;
        }
    }

    pub fn to_event(&self, kind: EventKind, order_id: &str) -> OrderEvent {
        OrderEvent {
            kind,
            order_id: order_id.to_string(),
            side: self.side,
            symbol: self.symbol.clone(),
            leverage: self.leverage.clone(),
            avg_price: self.avg_price.clone(),
            open_time: self.open_time.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticky_merge_never_erases() {
        let mut state = OrderState::first_sighting(
            &RawOrderRecord::new("A1")
                .with_symbol("SOLUSDT")
                .with_side(Side::Short)
                .with_leverage("25"),
        );

        state.merge_sticky(&RawOrderRecord::new("A1").with_avg_price("142.1"));
        assert_eq!(state.symbol.as_deref(), Some("SOLUSDT"));
        assert_eq!(state.side, Side::Short);
        assert_eq!(state.leverage.as_deref(), Some("25"));
        assert_eq!(state.avg_price.as_deref(), Some("142.1"));

        state.merge_sticky(&RawOrderRecord::new("A1").with_avg_price("150"));
        assert_eq!(state.avg_price.as_deref(), Some("150"));
    }

    #[test]
    fn test_phase_from_flags() {
        let mut state = OrderState::default();
        assert_eq!(state.phase(), Phase::Provisional);
        state.opened_notified = true;
        assert_eq!(state.phase(), Phase::Active);
        state.closed_notified = true;
        assert_eq!(state.phase(), Phase::Closed);
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let json = r#"{
            "seen": 4, "missing": 1, "openedNotified": true, "closedNotified": false,
            "symbol": "SOLUSDT", "side": "Short", "lev": "25", "avgPrice": "", "openTime": "2024-05-01"
        }"#;
        let state: OrderState = serde_json::from_str(json).unwrap();
        assert_eq!(state.seen_count, 4);
        assert_eq!(state.missing_count, 1);
        assert_eq!(state.leverage.as_deref(), Some("25"));
        assert_eq!(state.avg_price, None);
        assert_eq!(state.phase(), Phase::Active);
    }

    #[test]
    fn test_writes_camel_case() {
        let state = OrderState::first_sighting(&RawOrderRecord::new("A1").with_symbol("BTCUSDT"));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["seenCount"], 1);
        assert_eq!(value["openedNotified"], false);
        assert_eq!(value["symbol"], "BTCUSDT");
    }
}
