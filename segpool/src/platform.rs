//! Abstraction over OS differences.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::PagePlatform;

#[cfg(unix)]
pub(crate) use unix::FileMapping;
