//! Working directories and path resolution.
//!
//! [`path`] turns a raw, possibly relative path plus a current directory into
//! a normalized absolute path that can never escape the workspace root.
//! [`WorkingDirectories`] remembers the current directory of each caller in
//! each workspace.

pub mod path;
mod tracker;

pub use tracker::WorkingDirectories;
