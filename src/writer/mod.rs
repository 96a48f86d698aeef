use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, TilerError};
use crate::model::{OutputTile, TileCoord};

pub const DDM_EXTENSION: &str = "ddm";

/// Canonical location of a tile: `<root>/<zoom>/<qm>/<qn>.ddm`.
pub fn tile_path(root: &Path, coord: TileCoord) -> PathBuf {
    root.join(coord.zoom.to_string())
        .join(coord.qm.to_string())
        .join(format!("{}.{}", coord.qn, DDM_EXTENSION))
}

/// Writes tiles as raw little-endian f32 arrays under an output root.
#[derive(Debug, Clone)]
pub struct DdmWriter {
    root: PathBuf,
}

impl DdmWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the tile, replacing any existing file. The data is written to a
    /// temporary file next to the target and renamed into place, so readers
    /// never observe a partial tile.
    pub fn write(&self, tile: &OutputTile) -> Result<PathBuf> {
        let expected = tile.quad_size * tile.quad_size;
        if tile.heights.len() != expected {
            return Err(TilerError::InvalidConfiguration(format!(
                "tile {} has {} heights, expected {}",
                tile.coord,
                tile.heights.len(),
                expected
            )));
        }

        let path = tile_path(&self.root, tile.coord);
        // zoom/qm ディレクトリを作成（既に存在していてもよい）
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).map_err(|e| TilerError::io(&dir, e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| TilerError::io(&dir, e))?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            for h in &tile.heights {
                out.write_all(&h.to_le_bytes())
                    .map_err(|e| TilerError::io(&path, e))?;
            }
            out.flush().map_err(|e| TilerError::io(&path, e))?;
        }

        temp.persist(&path)
            .map_err(|e| TilerError::io(&path, e.error))?;

        Ok(path)
    }
}

/// Reads a `.ddm` file back into its heights.
pub fn read_ddm(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| TilerError::io(path, e))?;
    if bytes.len() % 4 != 0 {
        return Err(TilerError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} bytes is not a whole number of f32 values", bytes.len()),
            ),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tile() -> OutputTile {
        OutputTile {
            coord: TileCoord::new(3, 2, 5),
            quad_size: 2,
            heights: vec![0.0, -12.5, 1234.75, f32::MAX],
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DdmWriter::new(temp_dir.path());
        let tile = create_test_tile();

        let path = writer.write(&tile).unwrap();
        assert_eq!(path, temp_dir.path().join("3").join("2").join("5.ddm"));
        assert_eq!(fs::metadata(&path).unwrap().len(), 16);
        assert_eq!(read_ddm(&path).unwrap(), tile.heights);
    }

    #[test]
    fn test_layout_is_little_endian_without_header() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DdmWriter::new(temp_dir.path());
        let tile = OutputTile {
            coord: TileCoord::new(0, 0, 0),
            quad_size: 2,
            heights: vec![1.0, 2.0, 3.0, 4.0],
        };

        let path = writer.write(&tile).unwrap();
        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[12..], &[0x00, 0x00, 0x80, 0x40]);
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DdmWriter::new(temp_dir.path());
        let mut tile = create_test_tile();

        writer.write(&tile).unwrap();
        tile.heights = vec![7.0; 4];
        let path = writer.write(&tile).unwrap();

        assert_eq!(read_ddm(&path).unwrap(), vec![7.0; 4]);
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_wrong_height_count_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DdmWriter::new(temp_dir.path());
        let mut tile = create_test_tile();
        tile.heights.pop();

        assert!(matches!(
            writer.write(&tile),
            Err(TilerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unwritable_root_is_io_failure() {
        let temp_dir = TempDir::new().unwrap();
        // 出力ルートの位置に通常ファイルを置く
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let writer = DdmWriter::new(&blocker);
        assert!(matches!(
            writer.write(&create_test_tile()),
            Err(TilerError::IoFailure { .. })
        ));
    }

    #[test]
    fn test_read_rejects_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.ddm");
        fs::write(&path, [0u8; 6]).unwrap();
        assert!(read_ddm(&path).is_err());
    }
}
