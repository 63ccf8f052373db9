use crate::core::{BrowserTrait, DomQuery, FrameRef, RowInspection, Snapshot};
use crate::dom::row::RowParser;
use crate::errors::{Result, WatchError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reads the position table from whichever frame currently renders it.
pub struct FrameExtractor<B: BrowserTrait> {
    browser: Arc<B>,
    parser: Arc<RowParser>,
    row_selector: String,
    timeout: Duration,
}

impl<B: BrowserTrait> FrameExtractor<B> {
    pub fn new(
        browser: Arc<B>,
        parser: Arc<RowParser>,
        row_selector: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            browser,
            parser,
            row_selector: row_selector.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn bounded<T>(&self, what: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WatchError::ExtractionFailed(format!("{}: {}", what, e))),
            Err(_) => Err(WatchError::ExtractionFailed(format!(
                "{} timed out after {}ms",
                what,
                self.timeout.as_millis()
            ))),
        }
    }

    /// First frame with at least one matching row, plus how many frames were searched.
    async fn first_populated_frame(&self) -> Result<(Option<(FrameRef, Vec<String>)>, usize)> {
        let frames = self.bounded("listing frames", self.browser.frames()).await?;
        let mut searched = 0;

        for frame in frames {
            searched += 1;
            let what = format!("querying rows in {}", frame);
            let rows = self
                .bounded(&what, self.browser.query_rows(&frame, &self.row_selector))
                .await?;
            if !rows.is_empty() {
                return Ok((Some((frame, rows)), searched));
            }
        }

        Ok((None, searched))
    }
}

#[async_trait]
impl<B: BrowserTrait> DomQuery for FrameExtractor<B> {
    async fn snapshot(&self) -> Result<Snapshot> {
        let (found, _) = self.first_populated_frame().await?;
        let Some((frame, rows)) = found else {
            return Ok(Snapshot::default());
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        for html in &rows {
            let Some(record) = self.parser.parse_row(html) else {
                debug!(%frame, "skipping row without identifier or text");
                continue;
            };
            if !seen.insert(record.id.clone()) {
                debug!(%frame, id = %record.id, "duplicate row id in snapshot");
                continue;
            }
            records.push(record);
        }

        Ok(Snapshot {
            records,
            frame: Some(frame),
        })
    }

    async fn inspect(&self) -> Result<RowInspection> {
        let (found, frames_searched) = self.first_populated_frame().await?;
        Ok(match found {
            Some((frame, rows)) => RowInspection {
                frame: Some(frame.to_string()),
                frames_searched,
                row_count: rows.len(),
                rows,
            },
            None => RowInspection {
                frames_searched,
                ..RowInspection::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SelectorConfig;
    use crate::testing::{order_row, FakeBrowser};
    use crate::types::Side;
    use tokio_test::assert_ok;

    fn extractor(browser: &FakeBrowser) -> FrameExtractor<FakeBrowser> {
        let selectors = SelectorConfig::default();
        let parser = Arc::new(RowParser::new(&selectors).unwrap());
        FrameExtractor::new(Arc::new(browser.clone()), parser, selectors.row, 200)
    }

    #[tokio::test]
    async fn test_first_non_empty_frame_wins() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows("0", vec![]);
        browser.set_frame_rows("1", vec![order_row("B2", "ETHUSDT Short 5x", "3100", "")]);
        browser.set_frame_rows("1.0", vec![order_row("C3", "BTCUSDT Long 2x", "", "")]);

        let snapshot = assert_ok!(extractor(&browser).snapshot().await);
        assert_eq!(snapshot.frame, Some(FrameRef::nested("1")));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].id, "B2");
        assert_eq!(snapshot.records[0].side, Side::Short);
    }

    #[tokio::test]
    async fn test_empty_page_yields_empty_snapshot() {
        let browser = FakeBrowser::new();
        let snapshot = assert_ok!(extractor(&browser).snapshot().await);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.frame, None);
    }

    #[tokio::test]
    async fn test_query_failure_is_extraction_error() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows("", vec![order_row("A1", "SOLUSDT Short 25x", "", "")]);
        browser.fail_queries(true);

        let err = extractor(&browser).snapshot().await.unwrap_err();
        assert!(matches!(err, WatchError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn test_slow_query_times_out() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows("", vec![order_row("A1", "SOLUSDT Short 25x", "", "")]);
        browser.set_query_delay(Duration::from_millis(500));

        let err = extractor(&browser).snapshot().await.unwrap_err();
        assert!(matches!(err, WatchError::ExtractionFailed(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_row() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows(
            "",
            vec![
                order_row("A1", "SOLUSDT Short 25x", "142", ""),
                order_row("A1", "SOLUSDT Short 25x", "150", ""),
                order_row("A2", "BTCUSDT Long 3x", "", ""),
            ],
        );

        let snapshot = assert_ok!(extractor(&browser).snapshot().await);
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2"]);
        assert_eq!(snapshot.records[0].avg_price.as_deref(), Some("142"));
    }

    #[tokio::test]
    async fn test_identifierless_rows_with_same_summary_collapse() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows(
            "",
            vec![
                order_row("", "SOLUSDT Short 25x", "142", ""),
                order_row("", "SOLUSDT Short 25x", "150", ""),
            ],
        );

        let snapshot = assert_ok!(extractor(&browser).snapshot().await);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].avg_price.as_deref(), Some("142"));
    }

    #[tokio::test]
    async fn test_unchanged_page_gives_identical_snapshots() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows("", vec![order_row("", "SOLUSDT Short 25x", "142", "2024-05-01")]);
        let extractor = extractor(&browser);

        let first = assert_ok!(extractor.snapshot().await);
        let second = assert_ok!(extractor.snapshot().await);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_inspect_reports_raw_rows() {
        let browser = FakeBrowser::new();
        browser.set_frame_rows("0", vec![order_row("A1", "SOLUSDT Short 25x", "", "")]);

        let inspection = assert_ok!(extractor(&browser).inspect().await);
        assert_eq!(inspection.frame.as_deref(), Some("frame[0]"));
        assert_eq!(inspection.frames_searched, 2);
        assert_eq!(inspection.row_count, 1);
        assert!(inspection.rows[0].contains("SOLUSDT"));
    }
}
