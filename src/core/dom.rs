use crate::core::browser::FrameRef;
use crate::errors::Result;
use crate::types::RawOrderRecord;
use async_trait::async_trait;
use serde::Serialize;

/// Rows read from the first frame that had any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<RawOrderRecord>,
    pub frame: Option<FrameRef>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Raw markup of the matching rows, for operators debugging selectors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowInspection {
    pub frame: Option<String>,
    pub frames_searched: usize,
    pub row_count: usize,
    pub rows: Vec<String>,
}

/// Read-only access to the position table.
#[async_trait]
pub trait DomQuery: Send + Sync {
    async fn snapshot(&self) -> Result<Snapshot>;

    async fn inspect(&self) -> Result<RowInspection>;
}
