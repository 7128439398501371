//! Namespace and file-content operations layered over the on-disk structures.

pub mod directory;
pub mod file;
