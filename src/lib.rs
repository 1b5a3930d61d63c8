//! # Tilesmith
//!
//! Deterministic grid splitting, pan-and-ratio cropping, and cancellable batch
//! image jobs (enhancement, background removal) over in-memory images.
//!
//! # Architecture: Geometry → Sampler → Runner → Workflows
//!
//! ```text
//! source image ─► geometry (rectangles) ─► sampler (pixels) ─► work items
//!                                                                 │
//!                        enhancer / segmenter ◄── batch runner ◄──┘
//!                                                                 │
//!                                                  archive export ◄┘
//! ```
//!
//! - **Geometry** is pure math: tile rectangles for a grid, the sampling
//!   window for a crop. No pixels, no I/O.
//! - **Sampling** turns one fractional source rectangle into a new image.
//! - **The batch runner** drives work items through
//!   `Pending → Processing → Completed | Failed`, one at a time, with
//!   epoch-based cancellation.
//! - **Workflows** configure the runner per use case and own the rules for
//!   sending an item back to `Pending`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Grid and crop geometry, the [`imaging::Sampler`] trait, pure-Rust sampler, decode/encode |
//! | [`types`] | [`types::WorkItem`] and [`types::WorkStatus`], shared by runner and workflows |
//! | [`batch`] | [`batch::BatchRunner`]: sequential, cancellable runs over a batch |
//! | [`services`] | Enhancement and background-removal boundaries, built-in local upscaler |
//! | [`workflow`] | Split, Crop, Enhance and Segment controllers |
//! | [`archive`] | Writing exported images under unique names |
//! | [`naming`] | Download, archive and tile names |
//! | [`scan`] | Collecting and decoding input files |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Floor Once, Step Exactly
//!
//! A grid split floors the destination tile size once and reuses it for every
//! tile, while source rectangles advance in exact floating-point steps. Tiles
//! are therefore always identical in size and never drift across the image.
//!
//! ## One Item at a Time
//!
//! A run awaits each transform before starting the next. Peak memory stays at
//! one extra image, remote services see one request at a time, and results
//! arrive in submission order.
//!
//! ## Cancellation Without Preemption
//!
//! Remote calls cannot be interrupted, so cancelling bumps the runner's epoch
//! instead. A run re-checks the epoch before every write and quietly discards
//! whatever comes back after a cancel. Each runner has its own epoch, so
//! cancelling one workflow leaves the others running.
//!
//! ## Copy-on-Write Items
//!
//! A [`types::WorkItem`] handed to a reader never changes. Every transition
//! builds a new value and swaps it into the batch, so observers re-read after
//! each [`batch::BatchEvent`] and never see a half-written item.

pub mod archive;
pub mod batch;
pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod scan;
pub mod services;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_helpers;
