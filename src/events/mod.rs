//! # Events: the engine's signal surface.
//!
//! Everything the engine reports — per-job completions, progress, terminal
//! outcomes of a run, session transitions — flows through a broadcast
//! [`Bus`] as [`Event`] values. Terminal kinds of one run are mutually
//! exclusive: a run emits exactly one of [`EventKind::Finished`],
//! [`EventKind::Stopped`] or [`EventKind::Failed`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
