//! Aggregator driven the way the proxy drives it: frames in, ticks out.

use callscope::aggregation::{Aggregator, AggregatorConfig};
use callscope::labels::{NoLabels, SourceLabels};
use callscope_common::{CallTrace, SiteId, TraceFrame, TraceOrigin, ANONYMOUS};
use std::time::Duration;

fn trace(site: &str, name: &str, line: u32, duration: u64) -> CallTrace {
    CallTrace {
        process_id: 42,
        site: SiteId::from(site),
        function_name: name.to_string(),
        line,
        start_time: 10_000,
        exec_duration: duration,
        heap_delta: 64,
        nest_level: 1,
        child_duration: 0,
        called_by: None,
        callback_of: None,
    }
}

fn frame(traces: &[CallTrace]) -> TraceFrame {
    let mut frame = TraceFrame::new();
    for t in traces {
        frame.record(t);
    }
    frame
}

fn aggregator(max_age: u32) -> Aggregator {
    Aggregator::new(
        AggregatorConfig {
            max_age,
            use_context: false,
            hostname: "box".to_string(),
        },
        Box::new(NoLabels),
    )
}

#[test]
fn test_frames_from_several_agents_merge_per_window() {
    let mut agg = aggregator(3);
    agg.ingest_frame(frame(&[trace("app.rs:3:1", "load", 3, 10)]));
    agg.ingest_frame(frame(&[trace("app.rs:3:1", "load", 3, 30), trace("app.rs:9:1", "save", 9, 5)]));

    let snapshot = agg.tick();
    let load = snapshot.node("42:app.rs:3:1").unwrap();
    assert_eq!(load.node.num_calls, 2);
    assert_eq!(load.node.duration, 40);
    assert_eq!(load.node.mem_delta, 128);
    assert_eq!(load.age, 0);
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.host_metrics.hostname, "box");

    // Next window starts from zero
    let quiet = agg.tick();
    let load = quiet.node("42:app.rs:3:1").unwrap();
    assert_eq!(load.node.num_calls, 0);
    assert_eq!(load.age, 1);
}

#[test]
fn test_snapshot_json_shape() {
    let mut agg = aggregator(3);
    let mut callee = trace("app.rs:9:1", "save", 9, 5);
    callee.called_by = Some(TraceOrigin {
        process_id: 42,
        site: SiteId::from("app.rs:3:1"),
        start_time: 9_990,
    });
    agg.ingest_frame(frame(&[trace("app.rs:3:1", "load", 3, 10), callee]));

    let json = serde_json::to_value(agg.tick()).unwrap();
    let node = json["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["fun_name"] == "save")
        .unwrap();
    assert_eq!(node["age"], 0);
    assert_eq!(node["num_calls"], 1);

    let link = &json["links"][0];
    assert_eq!(link["type"], "call");
    assert_eq!(link["source"], "42:app.rs:3:1");
    assert_eq!(link["target"], "42:app.rs:9:1");
    assert_eq!(link["total_delay"], 10);
    assert!(json["timestamp"].as_u64().unwrap() > 0);
}

#[test]
fn test_idle_entries_evicted_after_max_age() {
    let mut agg = aggregator(2);
    agg.ingest(&trace("a.rs:1:1", "once", 1, 1));

    assert_eq!(agg.tick().nodes.len(), 1);
    assert_eq!(agg.tick().nodes.len(), 1);
    // Reaches max_age on this tick: still exported, then evicted
    let last = agg.tick();
    assert_eq!(last.nodes[0].age, 1);
    assert!(agg.tick().nodes.is_empty());
    assert_eq!(agg.node_count(), 0);
}

#[test]
fn test_anonymous_nodes_take_labels_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = "\
fn main() {
    let parse = |s: &str| s.len();
}
";
    std::fs::write(dir.path().join("app.rs"), source).unwrap();

    let labels = SourceLabels::new(Some(dir.path().to_path_buf()));
    let mut agg = Aggregator::new(
        AggregatorConfig {
            max_age: 5,
            use_context: true,
            hostname: String::new(),
        },
        Box::new(labels.clone()),
    );

    // First sight of the file starts the scan; the label lands later
    agg.ingest(&trace("app.rs:2:17", ANONYMOUS, 2, 1));
    for _ in 0..200 {
        if labels.is_settled("app.rs") {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(labels.is_settled("app.rs"));

    agg.ingest(&trace("app.rs:2:17", ANONYMOUS, 2, 1));
    let snapshot = agg.tick();
    assert_eq!(snapshot.node("42:app.rs:2:17").unwrap().node.fun_name, "variable parse");
}

#[test]
fn test_named_nodes_are_never_relabelled() {
    let labels = SourceLabels::new(None);
    let mut agg = Aggregator::new(AggregatorConfig::default(), Box::new(labels));
    agg.ingest(&trace("/nonexistent/x.rs:1:1", "explicit", 1, 1));
    assert_eq!(agg.node("42:/nonexistent/x.rs:1:1").unwrap().node.fun_name, "explicit");
}
