pub mod assembler;
pub mod cache;
pub mod config;
pub mod error;
pub mod grid;
pub mod model;
pub mod pipeline;
pub mod projection;
pub mod sampler;
pub mod source;
pub mod writer;

pub use cache::{CacheStats, DemFileCache};
pub use config::{SourceKind, TilerConfig};
pub use error::{SourceError, TilerError};
pub use model::{BoundingBox, CellKey, DemCell, GeoPoint, MercPoint, OutputTile, TileCoord};
pub use pipeline::{RunReport, TileOutcome, TilePipeline};
pub use sampler::{HeightSampler, NoDataPolicy};
pub use source::ElevationSource;
pub use writer::{read_ddm, tile_path, DdmWriter};
