//! Slice tracks served from a real SQLite store

use std::sync::Arc;

use slice_track::{
    ArgSet, ArgValue, DataRequest, Error, QueueInfo, RenderStageInfo, Selection, SliceKind,
    SliceTrack, SlicesBuilder, ThreadInfo, TimeSpan, TrackKind, CONCATED_IDS, SUBMISSION_IDS,
};
use trace_store::{GpuSliceRecord, ScopeEvent, SliceRecord, TraceStore};

const THREAD_TRACK: i64 = 1;
const GPU_TRACK: i64 = 2;

fn thread() -> ThreadInfo {
    ThreadInfo {
        track_id: THREAD_TRACK,
        tid: 4242,
        name: "main".into(),
    }
}

fn queue() -> QueueInfo {
    QueueInfo {
        track_id: GPU_TRACK,
        id: 0,
        name: "graphics".into(),
    }
}

/// In-memory store with the main thread registered
fn thread_store() -> Arc<TraceStore> {
    let store = Arc::new(TraceStore::open_in_memory().unwrap());
    store.add_thread(&thread()).unwrap();
    store
}

async fn thread_track(store: Arc<TraceStore>) -> SliceTrack {
    let track = SliceTrack::for_thread(store.clone(), store, thread());
    track.initialize().await.unwrap();
    track
}

fn record(store: &TraceStore, events: Vec<ScopeEvent>) {
    let mut recorder = store.recorder().unwrap();
    store.record(&mut recorder, events).unwrap();
}

#[tokio::test]
async fn test_missing_slice_is_not_found() {
    let store = thread_store();
    let track = thread_track(store).await;

    assert!(matches!(track.get_slice(999).await, Err(Error::NotFound(999))));
}

#[tokio::test]
async fn test_exact_window_keeps_every_slice() {
    let store = thread_store();
    let args: ArgSet = [("frame".to_string(), ArgValue::Int(1))].into_iter().collect();
    record(
        &store,
        vec![
            ScopeEvent::new(THREAD_TRACK, "frame", 0, 100).with_args(args.clone()),
            ScopeEvent::new(THREAD_TRACK, "draw", 10, 60).with_category("gfx"),
            // Outside the requested window
            ScopeEvent::new(THREAD_TRACK, "late", 5_000, 10),
        ],
    );
    let track = thread_track(store).await;

    let data = track
        .compute_data(DataRequest::new(TimeSpan::new(0, 1_000), 1))
        .await
        .unwrap();

    assert_eq!(data.len(), 2);
    assert_eq!(data.titles, vec!["frame", "draw"]);
    assert_eq!(data.starts, vec![0, 10]);
    assert_eq!(data.ends, vec![100, 70]);
    assert_eq!(data.depths, vec![0, 1]);
    assert_eq!(data.categories[1], "gfx");
    assert_eq!(data.args[0], args);
    assert!(data.args[1].is_empty());
    assert!(data.get_extra_strings(CONCATED_IDS).is_empty());
}

#[tokio::test]
async fn test_quantized_window_merges_and_drills_down() {
    let store = thread_store();
    let events = (0..10)
        .map(|i| ScopeEvent::new(THREAD_TRACK, "tick", i * 2_000, 1_000))
        .collect();
    record(&store, events);
    let track = thread_track(store).await;

    // quantum = min(10_000 * 5, 1_000_000 / 5) = 50_000
    let data = track
        .compute_data(DataRequest::new(TimeSpan::new(0, 1_000_000), 10_000))
        .await
        .unwrap();

    assert_eq!(data.len(), 1);
    assert_eq!(data.ids, vec![-1]);
    assert_eq!(data.titles, vec!["tick"]);
    assert_eq!(data.starts, vec![0]);
    assert_eq!(data.ends, vec![19_000]);

    let concated = &data.get_extra_strings(CONCATED_IDS)[0];
    assert_eq!(concated, "1,2,3,4,5,6,7,8,9,10");

    let slices = track.get_slices(concated).await.unwrap();
    assert_eq!(slices.len(), 10);
    assert!(slices.iter().all(|s| s.name == "tick" && s.args.is_empty()));

    assert!(matches!(
        track.get_slices("1,two").await,
        Err(Error::InvalidIdList(_))
    ));
}

#[tokio::test]
async fn test_gpu_queue_marker_and_submissions() {
    let store = Arc::new(TraceStore::open_in_memory().unwrap());
    store.add_gpu_queue(&queue()).unwrap();

    let slice = |id, ts, depth, name: &str| SliceRecord {
        id,
        track_id: GPU_TRACK,
        ts,
        dur: 50,
        category: String::new(),
        name: name.into(),
        depth,
        stack_id: id,
        parent_stack_id: 0,
        arg_set_id: 0,
    };
    store
        .insert_gpu_slices(&[
            GpuSliceRecord {
                slice: slice(1, 0, 0, "render pass"),
                stage: RenderStageInfo {
                    frame_buffer_name: "GBuffer".into(),
                    submission_id: 7,
                    ..Default::default()
                },
            },
            GpuSliceRecord {
                slice: slice(2, 100, 0, "blit"),
                stage: RenderStageInfo {
                    submission_id: 8,
                    ..Default::default()
                },
            },
        ])
        .unwrap();

    let track = SliceTrack::for_gpu_queue(store.clone(), store.clone(), queue());
    track.initialize().await.unwrap();
    assert_eq!(store.track(GPU_TRACK).unwrap(), Some(track.kind().clone()));

    let data = track
        .compute_data(DataRequest::new(TimeSpan::new(0, 1_000), 1))
        .await
        .unwrap();
    assert_eq!(data.titles, vec!["render pass[GBuffer]", "blit"]);
    assert_eq!(data.get_extra_longs(SUBMISSION_IDS), &[7, 8]);

    let picked = track.get_slice(1).await.unwrap();
    assert_eq!(picked.title(), "GPU Queue Events");
    match &picked.kind {
        SliceKind::Gpu(stage) => assert_eq!(stage.frame_buffer_name, "GBuffer"),
        other => panic!("expected a GPU slice, got {other:?}"),
    }
}

#[tokio::test]
async fn test_range_selection_builds_call_tree() {
    let store = thread_store();
    record(
        &store,
        vec![
            ScopeEvent::new(THREAD_TRACK, "frame", 0, 100),
            ScopeEvent::new(THREAD_TRACK, "draw", 10, 60),
            ScopeEvent::new(THREAD_TRACK, "frame", 200, 40),
            ScopeEvent::new(THREAD_TRACK, "draw", 210, 40),
        ],
    );
    let track = thread_track(store).await;

    let first = track
        .get_slices_in_range(TimeSpan::new(0, 150), 0, 4)
        .await
        .unwrap();
    let everything = track
        .get_slices_in_range(TimeSpan::new(0, 1_000), 0, 4)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(everything.len(), 4);

    let single = SlicesBuilder::new(first.clone()).unwrap().build().unwrap();
    let frame = &single.nodes()[0];
    assert_eq!(frame.name(), "frame");
    assert_eq!(frame.dur(), 100);
    assert_eq!(frame.self_dur(), 40);
    assert_eq!(frame.children()[0].dur(), 60);

    // Overlapping selections do not count the shared slices twice
    let combined = SlicesBuilder::new(first)
        .unwrap()
        .combine(SlicesBuilder::new(everything).unwrap())
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(combined.title(), "Thread Slices");
    assert_eq!(combined.len(), 4);
    let frame = &combined.nodes()[0];
    assert_eq!(frame.dur(), 140);
    assert_eq!(frame.self_dur(), 40);
    assert_eq!(frame.count(), 2);
    assert_eq!(combined.range(), Some(TimeSpan::new(0, 250)));

    assert!(matches!(
        track.get_slices_in_range(TimeSpan::new(0, 10), 3, 1).await,
        Err(Error::InvalidDepthRange { min: 3, max: 1 })
    ));
}

#[tokio::test]
async fn test_file_store_reopens_and_records_more() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.db");
    let first: ArgSet = [("pass".to_string(), ArgValue::Text("first".into()))]
        .into_iter()
        .collect();

    {
        let store = TraceStore::create(&path).unwrap();
        store.add_thread(&thread()).unwrap();
        record(
            &store,
            vec![ScopeEvent::new(THREAD_TRACK, "frame", 0, 100).with_args(first.clone())],
        );
    }

    let store = Arc::new(TraceStore::create(&path).unwrap());
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(
        store.track(THREAD_TRACK).unwrap(),
        Some(TrackKind::Thread(thread()))
    );

    // Registering again keeps the stored slices valid
    store.add_thread(&thread()).unwrap();

    let second: ArgSet = [("pass".to_string(), ArgValue::Text("second".into()))]
        .into_iter()
        .collect();
    record(
        &store,
        vec![ScopeEvent::new(THREAD_TRACK, "frame", 200, 100).with_args(second.clone())],
    );

    let track = SliceTrack::for_thread(store.clone(), store, thread());
    track.initialize().await.unwrap();

    let old = track.get_slice(1).await.unwrap();
    assert_eq!(old.name, "frame");
    assert_eq!(old.range(), Some(TimeSpan::new(0, 100)));
    assert_eq!(old.args, first);

    let new = track.get_slice(2).await.unwrap();
    assert_eq!(new.stack_id, old.stack_id);
    assert_eq!(new.args, second);
}

#[tokio::test]
async fn test_recording_needs_registered_track() {
    let store = TraceStore::open_in_memory().unwrap();
    let mut recorder = store.recorder().unwrap();
    let err = store
        .record(
            &mut recorder,
            vec![ScopeEvent::new(THREAD_TRACK, "frame", 0, 100)],
        )
        .unwrap_err();
    assert!(format!("{err:#}").contains("Track 1 is not registered"));
}
