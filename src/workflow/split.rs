//! Grid splitting of one source image.
//!
//! Splitting is a single local computation: [`SplitWorkflow::split`] samples
//! every tile (in parallel) and either replaces the tile set with all of them
//! or reports one error and leaves the previous tiles alone. Tiles then live in
//! the workflow's own runner so each can be enhanced on demand.

use super::{Enhance, WorkflowError, run_single};
use crate::archive::ArchiveEntry;
use crate::batch::{BatchEvent, BatchRunner, ItemOutcome};
use crate::imaging::{
    GeometryError, GridSpec, GridType, Image, RustSampler, Sampler, split_image,
};
use crate::naming::{split_archive_name, tile_id};
use crate::services::{Enhancer, LocalUpscaler};
use crate::types::{WorkItem, WorkStatus};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Largest tile count any preset produces.
const MAX_TILES: usize = 12;

/// The image being split.
#[derive(Debug, Clone)]
pub struct SplitSource {
    pub name: String,
    pub image: Image,
}

pub struct SplitWorkflow<S = RustSampler, E = LocalUpscaler> {
    sampler: S,
    enhancer: E,
    timeout: Option<Duration>,
    source: Mutex<Option<SplitSource>>,
    grid: Mutex<GridSpec>,
    tiles: BatchRunner,
}

impl SplitWorkflow<RustSampler, LocalUpscaler> {
    pub fn new() -> Self {
        Self::with_parts(RustSampler::new(), LocalUpscaler::default())
    }
}

impl Default for SplitWorkflow<RustSampler, LocalUpscaler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sampler, E: Enhancer> SplitWorkflow<S, E> {
    pub fn with_parts(sampler: S, enhancer: E) -> Self {
        Self {
            sampler,
            enhancer,
            timeout: None,
            source: Mutex::new(None),
            grid: Mutex::new(GridType::G9.layouts()[0]),
            tiles: BatchRunner::new(MAX_TILES),
        }
    }

    pub fn with_events(mut self, sender: Sender<BatchEvent>) -> Self {
        self.tiles = BatchRunner::new(MAX_TILES).with_events(sender);
        self
    }

    /// Bound every on-demand enhancement call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load a new source. Existing tiles are discarded.
    pub fn set_source(&self, name: impl Into<String>, image: Image) {
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(SplitSource {
            name: name.into(),
            image,
        });
        self.tiles.clear();
    }

    pub fn source(&self) -> Option<SplitSource> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Choose the grid for the next split. Current tiles stay until then.
    pub fn set_grid(&self, grid: GridSpec) {
        *self.grid.lock().unwrap_or_else(PoisonError::into_inner) = grid;
    }

    /// Choose a preset layout, e.g. `(GridType::G6, 1)` for 2×3.
    pub fn set_layout(&self, grid: GridType, layout: usize) -> Result<GridSpec, WorkflowError> {
        let spec = grid.layout(layout)?;
        self.set_grid(spec);
        Ok(spec)
    }

    pub fn grid(&self) -> GridSpec {
        *self.grid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Split the source into tiles `tile-0 .. tile-{n-1}`, row-major.
    ///
    /// All-or-nothing: on error the previous tiles are kept.
    pub fn split(&self) -> Result<usize, WorkflowError> {
        let source = self.source().ok_or(WorkflowError::NoSource)?;
        let grid = self.grid();
        if grid.tile_count() as usize > MAX_TILES {
            return Err(GeometryError::InvalidLayout(format!(
                "{}x{} grid has {} tiles, at most {MAX_TILES} are supported",
                grid.cols,
                grid.rows,
                grid.tile_count()
            ))
            .into());
        }
        let tiles =
            split_image(&self.sampler, &source.image, grid).map_err(WorkflowError::Split)?;

        let items: Vec<WorkItem> = tiles
            .into_iter()
            .map(|tile| {
                let id = tile_id(tile.index);
                WorkItem::new(id.clone(), id, tile.image)
            })
            .collect();
        let count = items.len();
        self.tiles.clear();
        self.tiles.add_all(items)?;
        Ok(count)
    }

    pub fn tiles(&self) -> Vec<Arc<WorkItem>> {
        self.tiles.snapshot()
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.tiles
    }

    /// Enhance one tile.
    ///
    /// A tile already enhanced is not sent again and reports `Completed`; a
    /// tile mid-enhancement is refused as busy.
    pub async fn enhance_tile(&self, id: &str) -> Result<ItemOutcome, WorkflowError> {
        let already_enhanced = self
            .tiles
            .get(id)
            .is_some_and(|tile| tile.status == WorkStatus::Completed && tile.result.is_some());
        if already_enhanced {
            return Ok(ItemOutcome::Completed);
        }
        Ok(run_single(&self.tiles, id, Enhance(&self.enhancer), self.timeout).await?)
    }

    /// Drop any in-flight enhancement result.
    pub fn cancel(&self) {
        self.tiles.cancel();
    }

    /// Forget the source and every tile.
    pub fn clear(&self) {
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.tiles.clear();
    }

    /// Every tile in order, enhanced version when there is one.
    pub fn export_all(&self) -> Vec<ArchiveEntry> {
        self.tiles
            .snapshot()
            .iter()
            .enumerate()
            .map(|(i, tile)| ArchiveEntry {
                name: split_archive_name(i + 1),
                image: tile.output().clone(),
            })
            .collect()
    }
}
