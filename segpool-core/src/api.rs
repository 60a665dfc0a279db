//! The API of segpool-core.

mod hook;
mod layout;
mod links;
mod platform;

pub use hook::{NoHook, PopHook};
pub use layout::{LayoutError, PartitionLayout};
pub use links::{END_OF_LIST, HeapLinks, Links, MappedLinks};
pub use platform::Platform;
