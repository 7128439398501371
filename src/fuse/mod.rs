pub mod filesystem;

pub use filesystem::{mount, BlockFuse};
