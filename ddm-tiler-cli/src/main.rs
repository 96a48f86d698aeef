use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ddm_tiler::model::{BoundingBox, GeoPoint};
use ddm_tiler::{NoDataPolicy, SourceKind, TilePipeline, TilerConfig, TilerError};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ズームレベル
    #[arg(short, long, visible_alias = "zoomlevel", default_value_t = 11)]
    zoom: u8,

    /// 範囲の北西端（経度 緯度）
    #[arg(
        long,
        num_args = 2,
        value_names = ["LON", "LAT"],
        allow_negative_numbers = true,
        default_values_t = [-180.0, 85.0]
    )]
    start: Vec<f64>,

    /// 範囲の南東端（経度 緯度）
    #[arg(
        long,
        num_args = 2,
        value_names = ["LON", "LAT"],
        allow_negative_numbers = true,
        default_values_t = [180.0, 0.0]
    )]
    end: Vec<f64>,

    /// タイル1辺あたりのサンプル数
    #[arg(short, long, default_value_t = 33)]
    quadsize: usize,

    /// 1度セルの標高ファイルがあるディレクトリ
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    inputdir: PathBuf,

    /// 全球の標高ラスタ（指定時は --inputdir より優先）
    #[arg(long, value_name = "FILE")]
    raster: Option<PathBuf>,

    /// 入力ディレクトリのファイル形式
    #[arg(long, value_enum, default_value_t = InputFormat::Hgt)]
    format: InputFormat,

    /// 出力ディレクトリ
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    outputdir: PathBuf,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,

    /// メモリに保持するセル数
    #[arg(long, default_value_t = ddm_tiler::cache::DEFAULT_CACHE_CAPACITY)]
    cache_size: usize,

    /// セル読み込みのタイムアウト（秒）
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// 標高データがないセルをエラーとして扱う
    #[arg(long)]
    strict_nodata: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum InputFormat {
    /// SRTM .hgt（N45E006.hgt）
    Hgt,
    /// GDALで読めるラスタ（<row>_<col>.tif）
    Gdal,
}

impl Args {
    fn to_config(&self) -> TilerConfig {
        let source = match (&self.raster, self.format) {
            (Some(path), _) => SourceKind::GdalRaster(path.clone()),
            (None, InputFormat::Hgt) => SourceKind::Hgt(self.inputdir.clone()),
            (None, InputFormat::Gdal) => SourceKind::GdalCells(self.inputdir.clone()),
        };

        TilerConfig {
            zoom: self.zoom,
            quad_size: self.quadsize,
            bbox: BoundingBox::new(
                GeoPoint::new(self.start[0], self.start[1]),
                GeoPoint::new(self.end[0], self.end[1]),
            ),
            source,
            output_dir: self.outputdir.clone(),
            cache_capacity: self.cache_size,
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            nodata: if self.strict_nodata {
                NoDataPolicy::Strict
            } else {
                NoDataPolicy::Ocean
            },
        }
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    // スレッドプールの設定
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err(TilerError::InvalidConfiguration(
                "thread count must be at least 1".to_string(),
            )
            .into());
        }
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let config = args.to_config();
    info!(
        "Converting ({}, {}) - ({}, {}) at zoom {} into {:?}",
        config.bbox.start.lon,
        config.bbox.start.lat,
        config.bbox.end.lon,
        config.bbox.end.lat,
        config.zoom,
        config.output_dir
    );

    let pipeline = TilePipeline::from_config(config).context("Failed to set up the tiler")?;
    let report = pipeline.run()?;

    // 失敗したタイルを報告
    if !report.failures.is_empty() {
        error!("Failed to process {} tiles:", report.failures.len());
        for (coord, err) in &report.failures {
            error!("  {}: {}", coord, err);
        }
        anyhow::bail!("{} tiles failed to process", report.failures.len());
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}
