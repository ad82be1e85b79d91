use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use slice_track::{DataRequest, SliceTrack, SlicesBuilder, TimeSpan, TrackConfig, TrackKind};
use tracing::{debug, info};
use trace_store::TraceStore;

mod logging;
mod report;

#[derive(Parser, Debug)]
#[command(name = "slicetool")]
#[command(about = "Inspect slice tracks stored in a trace database", long_about = None)]
struct Args {
    /// Trace database to read
    #[arg(long, value_name = "DB_FILE")]
    db: PathBuf,

    /// Track configuration (TOML)
    #[arg(long, value_name = "TOML_FILE")]
    config: Option<PathBuf>,

    /// Debug logging to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the tracks in the database
    Tracks,

    /// Render data for a window, merged when zoomed out
    Data {
        #[arg(long)]
        track: i64,
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        /// Nanoseconds per pixel
        #[arg(long)]
        resolution: i64,
    },

    /// Show one slice with its arguments
    Slice {
        #[arg(long)]
        track: i64,
        id: i64,
    },

    /// Expand a merged bucket, given its comma-joined ids
    Expand {
        #[arg(long)]
        track: i64,
        ids: String,
    },

    /// Call tree of the slices in a time and depth range
    Tree {
        #[arg(long)]
        track: i64,
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(long, default_value_t = 0)]
        min_depth: i32,
        #[arg(long, default_value_t = i32::MAX)]
        max_depth: i32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    if !args.db.exists() {
        bail!("Trace database does not exist: {}", args.db.display());
    }
    let store = Arc::new(TraceStore::create(&args.db)?);
    if let Some(created) = store.session_metadata("created")? {
        debug!(created = %created, "trace database session");
    }
    let config = match &args.config {
        Some(path) => TrackConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TrackConfig::default(),
    };
    debug!(?config, "track config");

    match args.command {
        Command::Tracks => {
            for track in store.tracks()? {
                println!("{}", report::track_line(&track));
            }
        }
        Command::Data {
            track,
            start,
            end,
            resolution,
        } => {
            let track = open_track(&store, track, config).await?;
            let request = DataRequest::new(TimeSpan::new(start, end), resolution);
            debug!(?request, "computing track data");
            print!("{}", report::data(&track.compute_data(request).await?));
        }
        Command::Slice { track, id } => {
            let track = open_track(&store, track, config).await?;
            print!("{}", report::slice(&track.get_slice(id).await?));
        }
        Command::Expand { track, ids } => {
            let track = open_track(&store, track, config).await?;
            for slice in track.get_slices(&ids).await? {
                print!("{}", report::slice(&slice));
            }
        }
        Command::Tree {
            track,
            start,
            end,
            min_depth,
            max_depth,
        } => {
            let track = open_track(&store, track, config).await?;
            let picked = track
                .get_slices_in_range(TimeSpan::new(start, end), min_depth, max_depth)
                .await?;
            info!(slices = picked.len(), "building call tree");
            let selection = SlicesBuilder::new(picked)?.build()?;
            print!("{}", report::tree(&selection));
        }
    }

    Ok(())
}

async fn open_track(store: &Arc<TraceStore>, track_id: i64, config: TrackConfig) -> Result<SliceTrack> {
    let kind = store
        .track(track_id)?
        .with_context(|| format!("No track with id {track_id}"))?;

    let track = match kind {
        TrackKind::Thread(thread) => SliceTrack::for_thread(store.clone(), store.clone(), thread),
        TrackKind::GpuQueue(queue) => SliceTrack::for_gpu_queue(store.clone(), store.clone(), queue),
    }
    .with_config(config);
    track.initialize().await?;
    debug!(track_id, view = %track.view_name(), kind = ?track.kind(), "opened track");
    Ok(track)
}
