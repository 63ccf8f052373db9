use crate::types::{EventKind, OrderEvent};
use std::fmt::Write;

/// Discord-flavoured markdown for one lifecycle event. Only fields that were
/// actually observed are listed.
pub fn render_event(event: &OrderEvent, page_url: &str) -> String {
    let indicator = event.side.indicator();
    let mut out = match event.kind {
        EventKind::Opened => format!(
            "{} **Position opened ({})**\n",
            indicator,
            event.side.label()
        ),
        EventKind::Closed => format!(
            "✅ {} **Position closed ({})**\n",
            indicator,
            event.side.label()
        ),
    };

    let _ = writeln!(out, "• Order: **{}**", event.order_id);
    if let Some(symbol) = &event.symbol {
        let _ = writeln!(out, "• Symbol: **{}**", symbol);
    }
    if let Some(leverage) = &event.leverage {
        let _ = writeln!(out, "• Leverage: **{}x**", leverage);
    }
    if let Some(avg_price) = &event.avg_price {
        let label = match event.kind {
            EventKind::Opened => "Average price",
            EventKind::Closed => "Average price (last seen)",
        };
        let _ = writeln!(out, "• {}: **{}**", label, avg_price);
    }
    if let Some(open_time) = &event.open_time {
        let _ = writeln!(out, "• Opened: {}", open_time);
    }
    let _ = write!(out, "• Page: {}", page_url);

    out
}

pub fn render_startup(page_url: &str) -> String {
    format!("🟢 Position watcher started (periodic reload active) • {}", page_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn event(kind: EventKind) -> OrderEvent {
        OrderEvent {
            kind,
            order_id: "A1".to_string(),
            side: Side::Short,
            symbol: Some("SOLUSDT".to_string()),
            leverage: Some("25".to_string()),
            avg_price: None,
            open_time: Some("2024-05-01 10:00".to_string()),
        }
    }

    #[test]
    fn test_opened_message_lists_known_fields_only() {
        let text = render_event(&event(EventKind::Opened), "https://example.com/t/1");
        assert!(text.starts_with("🔴⬇️ **Position opened (Short)**"));
        assert!(text.contains("• Order: **A1**"));
        assert!(text.contains("• Symbol: **SOLUSDT**"));
        assert!(text.contains("• Leverage: **25x**"));
        assert!(text.contains("• Opened: 2024-05-01 10:00"));
        assert!(!text.contains("Average price"));
        assert!(text.ends_with("• Page: https://example.com/t/1"));
    }

    #[test]
    fn test_closed_message_with_unknown_side() {
        let mut closed = event(EventKind::Closed);
        closed.side = Side::Unknown;
        closed.symbol = None;
        closed.avg_price = Some("142.5".to_string());

        let text = render_event(&closed, "https://example.com");
        assert!(text.starts_with("✅ ℹ️ **Position closed (N/A)**"));
        assert!(text.contains("• Average price (last seen): **142.5**"));
        assert!(!text.contains("Symbol"));
    }
}
