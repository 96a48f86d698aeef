//! Parallel conversion of a tile range to `.ddm` files.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::assembler::TileAssembler;
use crate::cache::DemFileCache;
use crate::config::TilerConfig;
use crate::error::{Result, TilerError};
use crate::grid::{dst_field_size, enumerate_tiles, TileRange};
use crate::model::TileCoord;
use crate::sampler::HeightSampler;
use crate::source::ElevationSource;
use crate::writer::DdmWriter;

/// Result of processing a single tile.
#[derive(Debug)]
pub enum TileOutcome {
    Written(PathBuf),
    /// Every sample was at or below sea level.
    Skipped,
    Failed(TilerError),
    Cancelled,
}

/// Totals of a run. Failures are kept per tile; one failed tile never stops
/// the others.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub written: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub failures: Vec<(TileCoord, String)>,
}

impl RunReport {
    pub fn record(&mut self, coord: TileCoord, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Written(_) => self.written += 1,
            TileOutcome::Skipped => self.skipped += 1,
            TileOutcome::Cancelled => self.cancelled += 1,
            TileOutcome::Failed(e) => self.failures.push((coord, e.to_string())),
        }
    }

    pub fn merge(mut self, other: RunReport) -> RunReport {
        self.written += other.written;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
        self.failures.extend(other.failures);
        self
    }

    pub fn total(&self) -> u64 {
        self.written + self.skipped + self.cancelled + self.failures.len() as u64
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }
}

pub struct TilePipeline {
    config: TilerConfig,
    cache: DemFileCache,
    writer: DdmWriter,
    cancel: Arc<AtomicBool>,
}

impl TilePipeline {
    pub fn new(config: TilerConfig, source: Arc<dyn ElevationSource>) -> Result<Self> {
        config.validate()?;

        let cache = DemFileCache::new(source, config.cache_capacity)
            .with_read_timeout(config.read_timeout);
        let writer = DdmWriter::new(&config.output_dir);

        Ok(Self {
            config,
            cache,
            writer,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Validates `config` and opens the source it names.
    pub fn from_config(config: TilerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let source = config.open_source()?;
        Ok(Self::new(config, source)?)
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    pub fn cache(&self) -> &DemFileCache {
        &self.cache
    }

    /// Setting the flag makes tiles that have not started yet report
    /// [`TileOutcome::Cancelled`]. Tiles already in progress finish.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn tiles(&self) -> TileRange {
        enumerate_tiles(self.config.zoom, &self.config.bbox)
    }

    pub fn process_tile(&self, coord: TileCoord) -> TileOutcome {
        if self.cancel.load(Ordering::Relaxed) {
            return TileOutcome::Cancelled;
        }

        let sampler = HeightSampler::new(&self.cache, self.config.nodata);
        let assembler = TileAssembler::new(sampler, self.config.quad_size);

        let tile = match assembler.build_tile(coord) {
            Ok(Some(tile)) => tile,
            Ok(None) => return TileOutcome::Skipped,
            Err(e) => return TileOutcome::Failed(e.into()),
        };

        match self.writer.write(&tile) {
            Ok(path) => {
                debug!("Written tile {}: {:?}", coord, path);
                TileOutcome::Written(path)
            }
            Err(e) => TileOutcome::Failed(e),
        }
    }

    /// Converts every tile in the configured range on the current rayon pool.
    pub fn run(&self) -> Result<RunReport> {
        let tiles = self.tiles();
        let zoom = tiles.zoom;
        info!(
            "Zoom {}: {} tiles ({} rows x {} columns), field size {}",
            zoom,
            tiles.len(),
            tiles.rows().len(),
            tiles.columns().len(),
            dst_field_size(zoom, self.config.quad_size)
        );

        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| TilerError::io(&self.config.output_dir, e))?;

        let start_time = Instant::now();

        // 行ごとに分割して並列処理
        let report = tiles
            .rows()
            .into_par_iter()
            .flat_map_iter(|qm| {
                tiles
                    .columns()
                    .map(move |qn| TileCoord::new(zoom, qm, qn))
            })
            .fold(RunReport::default, |mut report, coord| {
                let outcome = self.process_tile(coord);
                if let TileOutcome::Failed(e) = &outcome {
                    warn!("Tile {} failed: {}", coord, e);
                }
                report.record(coord, outcome);
                report
            })
            .reduce(RunReport::default, RunReport::merge);

        let stats = self.cache.stats();
        info!(
            "Finished in {:?}: {} written, {} skipped, {} failed, {} cancelled",
            start_time.elapsed(),
            report.written,
            report.skipped,
            report.failures.len(),
            report.cancelled
        );
        info!(
            "Cache: {} loads, {} hits, {} evictions",
            stats.loads, stats.hits, stats.evictions
        );

        Ok(report)
    }
}
