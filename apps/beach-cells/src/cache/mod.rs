//! Local replica of the shared cell grid.
//!
//! The authority owns the canonical state; the client keeps a packed copy in
//! [`BitStore`] that is rebuilt on every init frame and patched in place by
//! toggles, diffs and local clicks.

pub mod bits;

pub use bits::{BitStore, InitialCells};
