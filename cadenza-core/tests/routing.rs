mod common;

use cadenza_core::config::Config;
use cadenza_core::state::Project;
use cadenza_types::{ConnectionRequest, NodeId, PortType, RoutingDelta};

fn project_with(nodes: &[&str]) -> Project {
    let mut project = Project::new();
    for id in nodes {
        project.add_node(common::full_node(id)).unwrap();
    }
    project
}

fn rejection(project: &mut Project, request: ConnectionRequest) -> String {
    project.add_connection(request).unwrap_err().reason()
}

#[test]
fn test_connection_validation() {
    let mut project = project_with(&["a", "b"]);
    project
        .add_connection(ConnectionRequest::new("a", "audio_out", "b", "audio_in"))
        .unwrap();
    assert_eq!(
        rejection(&mut project, ConnectionRequest::new("b", "audio_out", "a", "audio_in")),
        "cycle"
    );
    assert_eq!(
        rejection(&mut project, ConnectionRequest::new("a", "audio_out", "b", "midi_in")),
        "type-mismatch"
    );
    assert_eq!(
        rejection(&mut project, ConnectionRequest::new("a", "audio_in", "b", "audio_in")),
        "direction"
    );
    // rejected attempts leave no trace in history
    assert_eq!(project.history().len(), 3);
}

#[test]
fn test_audio_stays_acyclic() {
    let ids = ["n0", "n1", "n2", "n3", "n4"];
    let mut project = project_with(&ids);
    // try every ordered pair; whatever is accepted must keep the audio graph a DAG
    for src in ids {
        for dst in ids {
            let _ = project.add_connection(ConnectionRequest::new(src, "audio_out", dst, "audio_in"));
            assert!(!project.routing().has_cycle(PortType::Audio));
        }
    }
    let order = project.routing().processing_order();
    assert_eq!(order.len(), ids.len());
    for conn in project.routing().connections() {
        let pos = |n: &NodeId| order.iter().position(|o| o == n).unwrap();
        assert!(pos(&conn.source_node) < pos(&conn.target_node));
    }
}

#[test]
fn test_modulation_and_trigger_targets() {
    let mut project = project_with(&["lfo", "synth"]);
    project
        .add_connection(ConnectionRequest::new("lfo", "mod_out", "synth", "level"))
        .unwrap();
    project
        .add_connection(ConnectionRequest::new("lfo", "mod_out", "synth", "mod_in"))
        .unwrap();
    project
        .add_connection(ConnectionRequest::new("lfo", "trig_out", "synth", "audio_in"))
        .unwrap();
    assert_eq!(
        rejection(&mut project, ConnectionRequest::new("lfo", "mod_out", "synth", "audio_in")),
        "type-mismatch"
    );
    // feedback modulation is allowed by default
    project
        .add_connection(ConnectionRequest::new("synth", "mod_out", "lfo", "level"))
        .unwrap();
    assert!(project.check_invariants().is_empty());
}

#[test]
fn test_strict_modulation_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[routing]\nallow_modulation_feedback = false\n").unwrap();
    let mut project = Project::with_config(&Config::load_from(Some(&path)));
    project.add_node(common::full_node("x")).unwrap();
    project.add_node(common::full_node("y")).unwrap();
    project
        .add_connection(ConnectionRequest::new("x", "mod_out", "y", "level"))
        .unwrap();
    assert_eq!(
        rejection(&mut project, ConnectionRequest::new("y", "mod_out", "x", "level")),
        "cycle"
    );
}

#[test]
fn test_remove_node_cascade_and_undo() {
    let mut project = project_with(&["src", "fx", "out"]);
    let a = project
        .add_connection(ConnectionRequest::new("src", "audio_out", "fx", "audio_in"))
        .unwrap();
    let b = project
        .add_connection(ConnectionRequest::new("fx", "audio_out", "out", "audio_in"))
        .unwrap();
    let c = project
        .add_connection(ConnectionRequest::new("src", "midi_out", "out", "midi_in"))
        .unwrap();

    let removal = project.remove_node(&NodeId::new("fx")).unwrap();
    assert_eq!(removal.connections.len(), 2);
    assert_eq!(project.routing().connection_ids(), &[c.clone()]);

    project.undo().unwrap();
    assert!(project.routing().node(&NodeId::new("fx")).is_some());
    for id in [&a, &b, &c] {
        assert!(project.routing().connection(id).is_some());
    }
    assert!(project.check_invariants().is_empty());

    project.redo().unwrap();
    assert_eq!(project.routing().connection_ids(), &[c]);
}

#[test]
fn test_engine_sees_deltas_through_undo() {
    let mut project = project_with(&["a", "b"]);
    let engine = project.subscribe_deltas();
    let id = project
        .add_connection(ConnectionRequest::new("a", "audio_out", "b", "audio_in").with_gain(0.8))
        .unwrap();
    project.undo().unwrap();
    project.redo().unwrap();

    let deltas: Vec<RoutingDelta> = engine.try_iter().collect();
    assert_eq!(deltas.len(), 3);
    assert!(matches!(deltas[0], RoutingDelta::ConnectionAdded { .. }));
    assert!(matches!(deltas[1], RoutingDelta::ConnectionRemoved { .. }));
    assert!(matches!(deltas[2], RoutingDelta::ConnectionAdded { gain: Some(_), .. }));
    assert!(deltas.iter().all(|d| d.connection_id() == &id));
}
