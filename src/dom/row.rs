use crate::core::config::SelectorConfig;
use crate::errors::{Result, WatchError};
use crate::types::{non_empty, RawOrderRecord, Side};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};

/// Collapses whitespace runs to single spaces and trims.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable key for a row whose identifier cell is empty: same text, same key,
/// across ticks and restarts.
pub fn fallback_key(text: &str) -> String {
    let digest = Sha256::digest(normalize_text(text).as_bytes());
    format!("row-{}", &hex::encode(digest)[..16])
}

/// Symbol, side and leverage packed in the summary cell, e.g. "SOLUSDT Perp Short 25x".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryFields {
    pub symbol: Option<String>,
    pub side: Side,
    pub leverage: Option<String>,
}

/// Compiled selectors turning one row's markup into a [`RawOrderRecord`].
#[derive(Debug)]
pub struct RowParser {
    order_id: Selector,
    summary: Selector,
    avg_price: Selector,
    open_time: Selector,
    symbol_pattern: Regex,
    leverage_pattern: Regex,
}

fn compile(name: &str, css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| WatchError::InvalidSelector(format!("{} '{}': {:?}", name, css, e)))
}

impl RowParser {
    pub fn new(config: &SelectorConfig) -> Result<Self> {
        // the row selector itself is evaluated in the page, but reject bad syntax early
        compile("row", &config.row)?;

        let symbol_pattern = Regex::new(&config.symbol_pattern).map_err(|e| {
            WatchError::ConfigurationError(format!("symbol pattern: {}", e))
        })?;
        let leverage_pattern = Regex::new(r"(?i)(\d+)\s*x").map_err(WatchError::from_any_error)?;

        Ok(Self {
            order_id: compile("order id", &config.order_id)?,
            summary: compile("summary", &config.summary)?,
            avg_price: compile("average price", &config.avg_price)?,
            open_time: compile("open time", &config.open_time)?,
            symbol_pattern,
            leverage_pattern,
        })
    }

    pub fn parse_summary(&self, text: &str) -> SummaryFields {
        let text = normalize_text(text);
        let symbol = self
            .symbol_pattern
            .find(&text)
            .map(|m| m.as_str().to_string());
        let leverage = self
            .leverage_pattern
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|lev| *lev > 0)
            .map(|lev| lev.to_string());

        SummaryFields {
            symbol,
            side: Side::from_text(&text),
            leverage,
        }
    }

    /// `None` when the row carries no identifier and no text to derive one from.
    pub fn parse_row(&self, outer_html: &str) -> Option<RawOrderRecord> {
        let document = parse_row_document(outer_html);
        let row = first_element(&document)?;

        let id_text: String = cell_text(&row, &self.order_id)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let summary = cell_text(&row, &self.summary);
        let avg_price = cell_text(&row, &self.avg_price);
        let open_time = cell_text(&row, &self.open_time);

        // Without an identifier, rows that differ only in price or other
        // volatile cells share a key, and the extractor keeps the first.
        let id = if !id_text.is_empty() {
            id_text
        } else {
            let identity = normalize_text(&format!("{} {}", summary, open_time));
            let source = if identity.is_empty() {
                element_text(&row)
            } else {
                identity
            };
            if source.is_empty() {
                return None;
            }
            fallback_key(&source)
        };

        let fields = self.parse_summary(&summary);
        Some(RawOrderRecord {
            id,
            symbol: fields.symbol,
            side: fields.side,
            leverage: fields.leverage,
            avg_price: non_empty(avg_price),
            open_time: non_empty(open_time),
        })
    }
}

fn parse_row_document(outer_html: &str) -> Html {
    let trimmed = outer_html.trim_start();
    let lower = trimmed.get(..3).unwrap_or("").to_ascii_lowercase();
    // a bare <tr> is dropped by the HTML parser outside of a table
    if lower == "<tr" {
        Html::parse_fragment(&format!("<table><tbody>{}</tbody></table>", trimmed))
    } else {
        Html::parse_fragment(trimmed)
    }
}

fn first_element(document: &Html) -> Option<ElementRef<'_>> {
    let root = document.root_element();
    let mut current = root;
    loop {
        let next = current.children().filter_map(ElementRef::wrap).next()?;
        match next.value().name() {
            "table" | "tbody" | "thead" => current = next,
            _ => return Some(next),
        }
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn cell_text(row: &ElementRef<'_>, selector: &Selector) -> String {
    row.select(selector)
        .next()
        .map(|cell| element_text(&cell))
        .unwrap_or_default()
}
