//! Plain-text rendering of track data, slices and call trees

use std::fmt::Write;

use slice_track::{Node, Selection, Slice, SliceData, SliceKind, Slices, TrackKind, CONCATED_IDS, SUBMISSION_IDS};

pub fn track_line(track: &TrackKind) -> String {
    match track {
        TrackKind::Thread(t) => format!("{:>6}  thread     tid {:<8} {}", t.track_id, t.tid, t.name),
        TrackKind::GpuQueue(q) => format!("{:>6}  gpu queue  id  {:<8} {}", q.track_id, q.id, q.name),
    }
}

pub fn data(data: &SliceData) -> String {
    let mut out = String::new();
    let concated = data.get_extra_strings(CONCATED_IDS);
    let submissions = data.get_extra_longs(SUBMISSION_IDS);

    let _ = writeln!(
        out,
        "{} rows for [{}, {}) at {} ns/px{}",
        data.len(),
        data.request.range.start,
        data.request.range.end,
        data.request.resolution,
        if concated.is_empty() { "" } else { " (merged)" },
    );
    for i in 0..data.len() {
        let indent = "  ".repeat(usize::try_from(data.depths[i]).unwrap_or(0));
        let _ = write!(
            out,
            "{:>12} {:>12}  {indent}{}",
            data.starts[i], data.ends[i], data.titles[i]
        );
        if let Some(ids) = concated.get(i) {
            let _ = write!(out, "  ids={ids}");
        } else {
            let _ = write!(out, "  id={}", data.ids[i]);
        }
        if let Some(submission) = submissions.get(i) {
            let _ = write!(out, "  submission={submission}");
        }
        out.push('\n');
    }
    out
}

pub fn slice(slice: &Slice) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} #{}", slice.title(), slice.id);
    let _ = writeln!(out, "  name      {}", slice.name);
    if !slice.category.is_empty() {
        let _ = writeln!(out, "  category  {}", slice.category);
    }
    let _ = writeln!(out, "  time      {} (+{} ns)", slice.time, slice.dur);
    let _ = writeln!(out, "  depth     {}", slice.depth);
    match &slice.kind {
        SliceKind::Thread(thread) => {
            let _ = writeln!(out, "  thread    {} ({})", thread.name, thread.tid);
        }
        SliceKind::Gpu(stage) => {
            let _ = writeln!(out, "  target    {} ({})", stage.frame_buffer_name, stage.frame_buffer_handle);
            let _ = writeln!(out, "  pass      {} ({})", stage.render_pass_name, stage.render_pass_handle);
            let _ = writeln!(out, "  commands  {} ({})", stage.command_buffer_name, stage.command_buffer_handle);
            let _ = writeln!(out, "  submit    {}", stage.submission_id);
        }
    }
    for (key, value) in slice.args.iter() {
        let _ = writeln!(out, "  {key} = {value}");
    }
    out
}

pub fn tree(selection: &Slices) -> String {
    let mut out = String::new();
    let _ = write!(out, "{}: {} slices", selection.title(), selection.len());
    if let Some(range) = selection.range() {
        let _ = write!(out, " over [{}, {})", range.start, range.end);
    }
    out.push('\n');
    let _ = writeln!(out, "{:>12} {:>12} {:>6}  name", "total", "self", "count");

    let mut stack: Vec<(&Node, usize)> = selection.nodes().iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, level)) = stack.pop() {
        let _ = writeln!(
            out,
            "{:>12} {:>12} {:>6}  {}{}",
            node.dur(),
            node.self_dur(),
            node.count(),
            "  ".repeat(level),
            node.name()
        );
        stack.extend(node.children().iter().rev().map(|c| (c, level + 1)));
    }
    out
}
