//! Shared item-state types used by the batch runner and every workflow.
//!
//! A [`WorkItem`] is never mutated after it is handed out. State changes
//! build a new value (`with_status`, `completed`, `failed`, `reset`) that
//! replaces the old one in the batch, so a reader holding an older snapshot
//! keeps seeing consistent data.

use crate::imaging::Image;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item identifier, unique within one batch.
pub type ItemId = String;

/// Per-item lifecycle: `Pending → Processing → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkStatus {
    /// Terminal for a run; a workflow may still reset the item to `Pending`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Processing => "processing",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One unit of batch work.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: ItemId,
    /// Display/file name of the source (e.g. `beach.jpg`, `tile-3`).
    pub name: String,
    pub source: Image,
    pub result: Option<Image>,
    pub status: WorkStatus,
    /// Message of the last failure, cleared on success or reset.
    pub error: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, source: Image) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            result: None,
            status: WorkStatus::Pending,
            error: None,
        }
    }

    pub fn with_status(&self, status: WorkStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn completed(&self, result: Image) -> Self {
        Self {
            status: WorkStatus::Completed,
            result: Some(result),
            error: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, message: impl Into<String>) -> Self {
        Self {
            status: WorkStatus::Failed,
            error: Some(message.into()),
            ..self.clone()
        }
    }

    /// Back to `Pending`, dropping any stale result.
    pub fn reset(&self) -> Self {
        Self {
            status: WorkStatus::Pending,
            result: None,
            error: None,
            ..self.clone()
        }
    }

    /// The result when there is one, otherwise the source.
    pub fn output(&self) -> &Image {
        self.result.as_ref().unwrap_or(&self.source)
    }
}

/// Serializable view of an item for `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub id: ItemId,
    pub name: String,
    pub status: WorkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub width: u32,
    pub height: u32,
    /// File written for this item, when it was exported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl From<&WorkItem> for ItemReport {
    fn from(item: &WorkItem) -> Self {
        let out = item.output();
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            status: item.status,
            error: item.error.clone(),
            width: out.width(),
            height: out.height(),
            file: None,
        }
    }
}
