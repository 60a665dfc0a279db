//! The internals of segpool-core.
//!
//! All the unsafe reinterpretation of free partitions is confined here.

pub(crate) mod atomic;
pub(crate) mod free_list;
pub(crate) mod tagged_pointer;
