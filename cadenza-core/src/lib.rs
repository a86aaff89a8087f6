//! # cadenza-core
//!
//! Shared state for a multi-view music editor: one canonical copy of every
//! event, clips that reference streams, a typed routing graph, grouped undo
//! across all of them, and the active context the views observe.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadenza_core::config::Config;
//! use cadenza_core::state::Project;
//! use cadenza_types::{ClipMeta, Event};
//!
//! let config = Config::load();
//! let mut project = Project::with_config(&config);
//!
//! // Several edits, one undo step. Views hear about it once, at end_group.
//! project.begin_group("New phrase");
//! let stream = project.create_stream("phrase");
//! project.add_events(&stream, vec![Event::note("n1", 0, 480, 60, 100)])?;
//! let clip = project.create_clip(&stream, ClipMeta::new("phrase", 1920))?;
//! project.end_group();
//!
//! project.undo()?;
//! ```
//!
//! ## Module Overview
//!
//! - [`state`] - the stores (`EventStore`, `ClipRegistry`, `RoutingGraph`),
//!   `UndoStack`, `ContextCoordinator`, the `Project` facade, snapshot
//!   persistence and workspace preferences
//! - [`config`] - TOML configuration (embedded defaults + user overrides)

pub mod config;
pub mod state;

pub use cadenza_types;
