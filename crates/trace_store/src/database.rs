//! SQLite storage for slices and their arguments

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::recorder::{Recorded, SliceRecorder};

use slice_track::{
    ArgResolver, ArgSet, ArgValue, QueryEngine, QueryError, QueryResult, QueueInfo,
    RenderStageInfo, Row, ThreadInfo, TrackKind, Value,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS track (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    ref_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS slice (
    id INTEGER PRIMARY KEY,
    track_id INTEGER NOT NULL,
    ts INTEGER NOT NULL,
    dur INTEGER NOT NULL,
    category TEXT,
    name TEXT NOT NULL,
    depth INTEGER NOT NULL,
    stack_id INTEGER NOT NULL,
    parent_stack_id INTEGER NOT NULL,
    arg_set_id INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY(track_id) REFERENCES track(id)
);

CREATE TABLE IF NOT EXISTS gpu_slice (
    id INTEGER PRIMARY KEY,
    track_id INTEGER NOT NULL,
    ts INTEGER NOT NULL,
    dur INTEGER NOT NULL,
    category TEXT,
    name TEXT NOT NULL,
    depth INTEGER NOT NULL,
    stack_id INTEGER NOT NULL,
    parent_stack_id INTEGER NOT NULL,
    arg_set_id INTEGER NOT NULL DEFAULT 0,
    render_target INTEGER,
    render_target_name TEXT,
    render_pass INTEGER,
    render_pass_name TEXT,
    command_buffer INTEGER,
    command_buffer_name TEXT,
    submission_id INTEGER,
    FOREIGN KEY(track_id) REFERENCES track(id)
);

CREATE TABLE IF NOT EXISTS args (
    arg_set_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    int_value INTEGER,
    real_value REAL,
    string_value TEXT,
    PRIMARY KEY (arg_set_id, key)
);

CREATE TABLE IF NOT EXISTS session_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_slice_track_ts ON slice(track_id, ts);
CREATE INDEX IF NOT EXISTS idx_gpu_slice_track_ts ON gpu_slice(track_id, ts);
CREATE INDEX IF NOT EXISTS idx_args_set ON args(arg_set_id);
"#;

const TRACK_THREAD: &str = "thread";
const TRACK_GPU_QUEUE: &str = "gpu_queue";

/// A slice as written to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRecord {
    pub id: i64,
    pub track_id: i64,
    pub ts: i64,
    pub dur: i64,
    pub category: String,
    pub name: String,
    pub depth: i32,
    pub stack_id: i64,
    pub parent_stack_id: i64,
    pub arg_set_id: i64,
}

/// A GPU queue slice and its render stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuSliceRecord {
    pub slice: SliceRecord,
    pub stage: RenderStageInfo,
}

/// Trace database. Safe to share between tasks; statements run one at a time.
pub struct TraceStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl TraceStore {
    /// Create or open a trace database at the given path
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open trace database {}", db_path.display()))?;

        // WAL lets readers run during writes; not every filesystem supports it
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");

        let store = Self::init(conn, Some(db_path))?;
        info!(path = ?store.db_path, "opened trace database");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to create schema")?;

        let now = chrono::Local::now();
        conn.execute(
            "INSERT OR IGNORE INTO session_metadata (key, value) VALUES (?1, ?2)",
            params!["created", now.to_rfc3339()],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO session_metadata (key, value) VALUES (?1, ?2)",
            params!["version", env!("CARGO_PKG_VERSION")],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn session_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM session_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn add_thread(&self, thread: &ThreadInfo) -> Result<()> {
        self.add_track(thread.track_id, TRACK_THREAD, thread.tid, &thread.name)
    }

    pub fn add_gpu_queue(&self, queue: &QueueInfo) -> Result<()> {
        self.add_track(queue.track_id, TRACK_GPU_QUEUE, queue.id, &queue.name)
    }

    fn add_track(&self, id: i64, kind: &str, ref_id: i64, name: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO track (id, kind, ref_id, name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind, ref_id = excluded.ref_id, name = excluded.name",
                params![id, kind, ref_id, name],
            )
            .with_context(|| format!("Failed to register track {id}"))?;
        Ok(())
    }

    /// Look up a registered track
    pub fn track(&self, track_id: i64) -> Result<Option<TrackKind>> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT kind, ref_id, name FROM track WHERE id = ?1",
                params![track_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(found.and_then(|(kind, ref_id, name)| match kind.as_str() {
            TRACK_THREAD => Some(TrackKind::Thread(ThreadInfo {
                track_id,
                tid: ref_id,
                name,
            })),
            TRACK_GPU_QUEUE => Some(TrackKind::GpuQueue(QueueInfo {
                track_id,
                id: ref_id,
                name,
            })),
            _ => None,
        }))
    }

    /// Every registered track, by id
    pub fn tracks(&self) -> Result<Vec<TrackKind>> {
        let ids: Vec<i64> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT id FROM track ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = self.track(id)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    /// Insert a batch of thread slices
    pub fn insert_slices(&self, slices: &[SliceRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        write_slices(&tx, slices)?;
        tx.commit().context("Failed to insert slices")?;
        debug!(count = slices.len(), "inserted slices");
        Ok(())
    }

    /// Insert a batch of GPU queue slices
    pub fn insert_gpu_slices(&self, slices: &[GpuSliceRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO gpu_slice
                 (id, track_id, ts, dur, category, name, depth, stack_id, parent_stack_id, arg_set_id,
                  render_target, render_target_name, render_pass, render_pass_name,
                  command_buffer, command_buffer_name, submission_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for GpuSliceRecord { slice: s, stage } in slices {
                stmt.execute(params![
                    s.id,
                    s.track_id,
                    s.ts,
                    s.dur,
                    s.category,
                    s.name,
                    s.depth,
                    s.stack_id,
                    s.parent_stack_id,
                    s.arg_set_id,
                    stage.frame_buffer_handle,
                    stage.frame_buffer_name,
                    stage.render_pass_handle,
                    stage.render_pass_name,
                    stage.command_buffer_handle,
                    stage.command_buffer_name,
                    stage.submission_id,
                ])?;
            }
        }
        tx.commit().context("Failed to insert GPU slices")?;
        debug!(count = slices.len(), "inserted GPU slices");
        Ok(())
    }

    /// Store the entries of one argument set
    pub fn insert_args(&self, arg_set_id: i64, args: &ArgSet) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        write_args(&tx, arg_set_id, args)?;
        tx.commit()
            .with_context(|| format!("Failed to insert arg set {arg_set_id}"))?;
        Ok(())
    }

    /// Write recorder output in one transaction. Every track it names must be registered.
    pub fn insert_recorded(&self, recorded: &Recorded) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let track_ids: HashSet<i64> = recorded.slices.iter().map(|s| s.track_id).collect();
        for track_id in track_ids {
            tx.query_row("SELECT 1 FROM track WHERE id = ?1", params![track_id], |_| Ok(()))
                .optional()?
                .with_context(|| format!("Track {track_id} is not registered"))?;
        }
        for (arg_set_id, args) in &recorded.args {
            write_args(&tx, *arg_set_id, args)
                .with_context(|| format!("Failed to insert arg set {arg_set_id}"))?;
        }
        write_slices(&tx, &recorded.slices)?;

        tx.commit().context("Failed to insert recorded slices")?;
        debug!(
            slices = recorded.slices.len(),
            arg_sets = recorded.args.len(),
            "inserted recorded slices"
        );
        Ok(())
    }

    /// A recorder that continues after the ids already stored
    pub fn recorder(&self) -> Result<SliceRecorder> {
        let conn = self.conn.lock();
        let last_slice_id: Option<i64> = conn.query_row(
            "SELECT MAX(id) FROM (SELECT id FROM slice UNION ALL SELECT id FROM gpu_slice)",
            [],
            |row| row.get(0),
        )?;
        let last_arg_set_id: Option<i64> = conn.query_row(
            "SELECT MAX(arg_set_id) FROM (
                 SELECT arg_set_id FROM args
                 UNION ALL SELECT arg_set_id FROM slice
                 UNION ALL SELECT arg_set_id FROM gpu_slice)",
            [],
            |row| row.get(0),
        )?;
        let last_stack_id: Option<i64> = conn.query_row(
            "SELECT MAX(id) FROM (
                 SELECT stack_id AS id FROM slice
                 UNION ALL SELECT parent_stack_id FROM slice
                 UNION ALL SELECT stack_id FROM gpu_slice
                 UNION ALL SELECT parent_stack_id FROM gpu_slice)",
            [],
            |row| row.get(0),
        )?;

        let mut stacks: HashMap<(i64, String), i64> = HashMap::new();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT parent_stack_id, name, stack_id FROM slice ORDER BY stack_id",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stacks.entry((row.get(0)?, row.get(1)?)).or_insert(row.get(2)?);
        }

        debug!(
            ?last_slice_id,
            ?last_arg_set_id,
            call_paths = stacks.len(),
            "resuming recorder"
        );
        Ok(SliceRecorder::resume(
            last_slice_id.unwrap_or(0),
            last_arg_set_id.unwrap_or(0),
            last_stack_id.unwrap_or(0),
            stacks,
        ))
    }

    fn run_query(&self, sql: &str) -> rusqlite::Result<QueryResult> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns = stmt.column_count();
        if columns == 0 {
            stmt.execute([])?;
            return Ok(QueryResult::default());
        }

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null | ValueRef::Blob(_) => Value::Null,
                    ValueRef::Integer(v) => Value::Long(v),
                    ValueRef::Real(v) => Value::Real(v),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                });
            }
            out.push(Row::new(values));
        }
        Ok(QueryResult::new(out))
    }

    fn load_args(&self, ids: &HashSet<i64>) -> rusqlite::Result<HashMap<i64, ArgSet>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT arg_set_id, key, int_value, real_value, string_value
             FROM args WHERE arg_set_id IN ({list})"
        ))?;

        let mut grouped: HashMap<i64, BTreeMap<String, ArgValue>> = HashMap::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let value = match (
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ) {
                (Some(v), _, _) => ArgValue::Int(v),
                (None, Some(v), _) => ArgValue::Real(v),
                (None, None, v) => ArgValue::Text(v.unwrap_or_default()),
            };
            grouped
                .entry(row.get(0)?)
                .or_default()
                .insert(row.get(1)?, value);
        }
        Ok(grouped
            .into_iter()
            .map(|(id, entries)| (id, ArgSet::new(entries)))
            .collect())
    }
}

fn write_slices(tx: &Transaction<'_>, slices: &[SliceRecord]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO slice
         (id, track_id, ts, dur, category, name, depth, stack_id, parent_stack_id, arg_set_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for s in slices {
        stmt.execute(params![
            s.id,
            s.track_id,
            s.ts,
            s.dur,
            s.category,
            s.name,
            s.depth,
            s.stack_id,
            s.parent_stack_id,
            s.arg_set_id,
        ])?;
    }
    Ok(())
}

fn write_args(tx: &Transaction<'_>, arg_set_id: i64, args: &ArgSet) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO args (arg_set_id, key, int_value, real_value, string_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (key, value) in args.iter() {
        let (int_value, real_value, string_value) = match value {
            ArgValue::Int(v) => (Some(*v), None, None),
            ArgValue::Real(v) => (None, Some(*v), None),
            ArgValue::Text(v) => (None, None, Some(v.as_str())),
        };
        stmt.execute(params![arg_set_id, key, int_value, real_value, string_value])?;
    }
    Ok(())
}

fn backend(err: rusqlite::Error) -> QueryError {
    QueryError::Backend(err.to_string())
}

#[async_trait]
impl QueryEngine for TraceStore {
    async fn query(&self, sql: &str) -> Result<QueryResult, QueryError> {
        self.run_query(sql).map_err(backend)
    }
}

#[async_trait]
impl ArgResolver for TraceStore {
    async fn resolve_many(&self, ids: &HashSet<i64>) -> Result<HashMap<i64, ArgSet>, QueryError> {
        self.load_args(ids).map_err(backend)
    }
}
