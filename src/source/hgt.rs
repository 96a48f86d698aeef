use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use super::ElevationSource;
use crate::error::SourceError;
use crate::model::{CellKey, DemCell};

/// Samples per side of an SRTM3 (3 arc-second) file.
pub const SRTM3_SIZE: usize = 1201;
/// Samples per side of an SRTM1 (1 arc-second) file.
pub const SRTM1_SIZE: usize = 3601;

const SRTM_VOID: i16 = -32768;

/// Directory of SRTM `.hgt` files named after their south-west corner.
#[derive(Debug, Clone)]
pub struct HgtDirectory {
    dir: PathBuf,
}

impl HgtDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: CellKey) -> PathBuf {
        self.dir.join(key.hgt_file_name())
    }
}

impl ElevationSource for HgtDirectory {
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SourceError::NotFound(key)),
            Err(e) => {
                return Err(SourceError::Read {
                    key,
                    reason: format!("{}: {}", path.display(), e),
                })
            }
        };

        debug!("Loaded {:?} ({} bytes)", path, bytes.len());
        parse_hgt(key, &bytes)
    }
}

/// Decodes a raw `.hgt` buffer: big-endian i16, row 0 at the north edge.
/// The grid size is taken from the buffer length. Voids read as 0.
pub fn parse_hgt(key: CellKey, bytes: &[u8]) -> Result<DemCell, SourceError> {
    let size = match bytes.len() {
        n if n == SRTM3_SIZE * SRTM3_SIZE * 2 => SRTM3_SIZE,
        n if n == SRTM1_SIZE * SRTM1_SIZE * 2 => SRTM1_SIZE,
        n => {
            // 正方形のグリッドであれば任意のサイズを受け付ける
            let side = ((n / 2) as f64).sqrt().round() as usize;
            if side < 2 || side * side * 2 != n {
                return Err(SourceError::Read {
                    key,
                    reason: format!("unexpected .hgt size of {} bytes", n),
                });
            }
            side
        }
    };

    let heights = bytes
        .chunks_exact(2)
        .map(|pair| match i16::from_be_bytes([pair[0], pair[1]]) {
            SRTM_VOID => 0.0,
            h => h as f32,
        })
        .collect();

    DemCell::new(key, size, size, heights)
}
