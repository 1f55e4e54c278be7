//! Core domain types for the relay.
//!
//! Identifiers are newtypes; events and build records are plain data that
//! (de)serialize with serde.

pub mod build;
pub mod event;
pub mod ids;

pub use build::{Patch, PatchBuild};
pub use event::{Change, Event, PatchSet, RefUpdate, kind};
pub use ids::{BuildNumber, ChangeNumber, PatchSetNumber};
