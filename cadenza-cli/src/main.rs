use std::path::PathBuf;
use std::process::ExitCode;

use cadenza_core::config::Config;
use cadenza_core::state::Project;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    if let Err(e) = TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("logger unavailable: {e}");
    }
}

fn usage() {
    eprintln!("usage: cadenza-inspect <project.json> [--verbose] [--events]");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let list_events = args.iter().any(|a| a == "--events");
    init_logging(verbose);

    let Some(path) = args.iter().skip(1).find(|a| !a.starts_with('-')).map(PathBuf::from) else {
        usage();
        return ExitCode::from(2);
    };

    let config = Config::load();
    log::debug!(target: "cli", "opening {}", path.display());
    let project = match Project::open(&path, &config) {
        Ok(project) => project,
        Err(e) => {
            log::error!(target: "cli", "failed to open {}: {}", path.display(), e);
            eprintln!("{}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    print_summary(&project, list_events);

    let problems = project.check_invariants();
    if problems.is_empty() {
        println!("\nok: no invariant violations");
        ExitCode::SUCCESS
    } else {
        println!("\n{} invariant violation(s):", problems.len());
        for problem in &problems {
            println!("  - {problem}");
        }
        ExitCode::FAILURE
    }
}

fn print_summary(project: &Project, list_events: bool) {
    let events = project.events();
    let clips = project.clips();
    let routing = project.routing();

    println!("streams: {}", events.len());
    for stream in events.streams() {
        let users = clips.list_clips_for_stream(&stream.id).len();
        println!(
            "  {:<16} {:<20} {:>5} events  {:>3} clip(s)",
            stream.id,
            stream.name,
            stream.len(),
            users
        );
        if list_events {
            for event in stream.events() {
                println!(
                    "      {:<12} {:>8} +{:<6} {:?}",
                    event.id(),
                    event.start(),
                    event.duration(),
                    event.payload()
                );
            }
        }
    }

    println!("clips: {}", clips.len());
    for clip in clips.clips() {
        println!(
            "  {:<16} {:<20} -> {:<16} len {}{}",
            clip.id,
            clip.name,
            clip.stream_id,
            clip.duration,
            if clip.looping { " (loop)" } else { "" }
        );
    }

    println!("nodes: {}", routing.node_ids().len());
    for node in routing.nodes() {
        println!(
            "  {:<16} {:<12} {} in / {} out",
            node.id,
            node.kind,
            node.inputs.len(),
            node.outputs.len()
        );
    }

    println!("connections: {}", routing.connection_ids().len());
    for conn in routing.connections() {
        let gain = conn.gain.map(|g| format!(" gain {g}")).unwrap_or_default();
        println!(
            "  {:<10} {}:{} -> {}:{} [{}]{}{}",
            conn.id,
            conn.source_node,
            conn.source_port,
            conn.target_node,
            conn.target_port,
            conn.connection_type,
            gain,
            if conn.enabled { "" } else { " (disabled)" }
        );
    }

    let order: Vec<String> = routing.processing_order().iter().map(|n| n.to_string()).collect();
    println!("processing order: {}", order.join(" -> "));
}
