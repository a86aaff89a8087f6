#![allow(dead_code)]

use cadenza_core::state::Project;
use cadenza_types::{
    ClipId, ClipMeta, Event, Port, PortType, RoutingNode, StreamId, ViewKind, WorkspaceDescriptor,
};

/// Four ascending notes plus a looping clip over them, as one undo step.
pub fn add_melody(project: &mut Project) -> (StreamId, ClipId) {
    project.begin_group("Add melody");
    let stream = project.create_stream("melody");
    let notes = [60u8, 62, 64, 67]
        .iter()
        .enumerate()
        .map(|(i, &pitch)| Event::note(format!("m{i}"), i as u64 * 480, 480, pitch, 100))
        .collect();
    project.add_events(&stream, notes).unwrap();
    let clip = project
        .create_clip(&stream, ClipMeta::new("melody", 1920).looping(true))
        .unwrap();
    project.end_group();
    (stream, clip)
}

/// A node with one input and one output of each signal type, plus a
/// parameter input.
pub fn full_node(id: &str) -> RoutingNode {
    RoutingNode::new(id, "device")
        .with_port(Port::input("audio_in", "Audio In", PortType::Audio))
        .with_port(Port::input("midi_in", "MIDI In", PortType::Midi))
        .with_port(Port::input("mod_in", "Mod In", PortType::Modulation))
        .with_port(Port::input("gate", "Gate", PortType::Trigger))
        .with_port(Port::input("level", "Level", PortType::Audio).parameter())
        .with_port(Port::output("audio_out", "Audio Out", PortType::Audio))
        .with_port(Port::output("midi_out", "MIDI Out", PortType::Midi))
        .with_port(Port::output("mod_out", "Mod Out", PortType::Modulation))
        .with_port(Port::output("trig_out", "Trigger Out", PortType::Trigger))
}

pub fn register_standard_workspaces(project: &mut Project) {
    let ctx = project.context_mut();
    for kind in ViewKind::ALL {
        ctx.register_view_factory(kind);
    }
    ctx.register_workspace(WorkspaceDescriptor::new(
        "arrange",
        "Arrange",
        vec![ViewKind::PianoRoll, ViewKind::ClipLauncher],
    ))
    .unwrap();
    ctx.register_workspace(WorkspaceDescriptor::new(
        "score",
        "Score",
        vec![ViewKind::Notation],
    ))
    .unwrap();
    ctx.register_workspace(WorkspaceDescriptor::new(
        "beats",
        "Beats",
        vec![ViewKind::StepGrid, ViewKind::PianoRoll],
    ))
    .unwrap();
}
