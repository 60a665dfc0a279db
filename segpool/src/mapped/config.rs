//! The configuration of a `MappedPool`, and its validation.

use std::path::PathBuf;

use segpool_core::PartitionLayout;

use crate::ConfigError;

use super::header::Header;

/// How the backing file is accessed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AccessMode {
    /// The file is (re)created, discarding any previous content.
    CreateNew,
    /// The file is created if missing, and reused otherwise; changes are written back to the file.
    PersistentReuse,
    /// The file is mapped copy-on-write; changes never reach the file.
    ReadOnly,
}

/// The state of the backing file, prior to opening the pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FileState {
    /// The file does not exist.
    NonExistent,
    /// The file exists, and its size matches the configuration.
    ExistsRightSize,
    /// The file exists, and its size does not match the configuration.
    ExistsWrongSize,
}

/// The configuration of a `MappedPool`.
///
/// A mapping size of 0 means that the size is derived from the existing file. In this case, the file is considered
/// to be of the right size if the bytes past its header form a whole number of partitions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MappedConfig {
    /// The path of the backing file.
    pub path: PathBuf,
    /// The size of each partition, in bytes.
    pub partition_size: usize,
    /// The size of the mapping in bytes, header included, or 0 to use the size of the existing file.
    pub mapping_size: usize,
    /// How the file is accessed.
    pub mode: AccessMode,
    /// Whether the previous content of the file is discarded.
    pub zero_init: bool,
}

impl MappedConfig {
    /// Creates a configuration reusing the file at `path`, of whichever size it already has.
    pub fn new(path: impl Into<PathBuf>, partition_size: usize) -> Self {
        Self {
            path: path.into(),
            partition_size,
            mapping_size: 0,
            mode: AccessMode::PersistentReuse,
            zero_init: false,
        }
    }

    /// Sets the size of the mapping, 0 to use the size of the existing file.
    pub fn with_mapping_size(mut self, size: usize) -> Self {
        self.mapping_size = size;
        self
    }

    /// Sets the access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether the previous content of the file is discarded.
    pub fn with_zero_init(mut self, zero_init: bool) -> Self {
        self.zero_init = zero_init;
        self
    }

    /// Returns whether the size of the mapping is specified.
    pub fn is_size_specified(&self) -> bool { self.mapping_size != 0 }

    /// Validates the configuration against the state of the file, returning the layout of its partitions.
    ///
    /// The combinations rejected are:
    ///
    /// -   A missing file, opened read-only.
    /// -   A read-only mapping, zero-initialized.
    /// -   A missing file, with an unspecified size.
    /// -   A file of the wrong size, zero-initialized.
    pub fn validate(&self, file: FileState) -> Result<PartitionLayout, ConfigError> {
        let layout = PartitionLayout::new(self.partition_size)?;

        if self.mode == AccessMode::ReadOnly {
            if file == FileState::NonExistent {
                return Err(ConfigError::ReadOnlyMissingFile);
            }

            if self.zero_init {
                return Err(ConfigError::ReadOnlyZeroInit);
            }
        }

        if file == FileState::NonExistent && !self.is_size_specified() {
            return Err(ConfigError::UnknownMappingSize);
        }

        if file == FileState::ExistsWrongSize && self.zero_init {
            return Err(ConfigError::ZeroInitWrongSize);
        }

        Ok(layout)
    }

    /// Returns the state of the file, given its length if it exists.
    pub(crate) fn file_state(&self, layout: PartitionLayout, length: Option<usize>) -> FileState {
        let Some(length) = length else { return FileState::NonExistent };

        let right = if self.is_size_specified() {
            length == self.mapping_size
        } else {
            let header = Header::size(layout);

            length > header && (length - header) % layout.size() == 0
        };

        if right { FileState::ExistsRightSize } else { FileState::ExistsWrongSize }
    }
}

#[cfg(test)]
mod tests {

use super::*;

use AccessMode::*;
use FileState::*;

fn config(size: usize, mode: AccessMode, zero_init: bool) -> MappedConfig {
    MappedConfig::new("pool.bin", 16).with_mapping_size(size).with_mode(mode).with_zero_init(zero_init)
}

#[test]
fn mapped_config_defaults() {
    let config = MappedConfig::new("pool.bin", 32);

    assert_eq!(PathBuf::from("pool.bin"), config.path);
    assert_eq!(32, config.partition_size);
    assert_eq!(0, config.mapping_size);
    assert_eq!(PersistentReuse, config.mode);
    assert!(!config.zero_init);
    assert!(!config.is_size_specified());
}

#[test]
fn mapped_config_invalid_layout() {
    let config = MappedConfig::new("pool.bin", 4).with_mapping_size(4096);

    assert!(matches!(config.validate(NonExistent), Err(ConfigError::Layout(_))));
}

#[test]
fn mapped_config_read_only() {
    assert_eq!(Err(ConfigError::ReadOnlyMissingFile), config(4096, ReadOnly, false).validate(NonExistent));
    assert_eq!(Err(ConfigError::ReadOnlyZeroInit), config(4096, ReadOnly, true).validate(ExistsRightSize));

    assert!(config(4096, ReadOnly, false).validate(ExistsRightSize).is_ok());
    assert!(config(4096, ReadOnly, false).validate(ExistsWrongSize).is_ok());
}

#[test]
fn mapped_config_unknown_size() {
    assert_eq!(Err(ConfigError::UnknownMappingSize), config(0, CreateNew, false).validate(NonExistent));
    assert_eq!(Err(ConfigError::UnknownMappingSize), config(0, PersistentReuse, true).validate(NonExistent));

    assert!(config(4096, CreateNew, false).validate(NonExistent).is_ok());
    assert!(config(4096, PersistentReuse, true).validate(NonExistent).is_ok());
}

#[test]
fn mapped_config_zero_init_wrong_size() {
    assert_eq!(Err(ConfigError::ZeroInitWrongSize), config(4096, CreateNew, true).validate(ExistsWrongSize));
    assert_eq!(Err(ConfigError::ZeroInitWrongSize), config(0, PersistentReuse, true).validate(ExistsWrongSize));

    assert!(config(4096, PersistentReuse, true).validate(ExistsRightSize).is_ok());
    assert!(config(4096, PersistentReuse, false).validate(ExistsWrongSize).is_ok());
}

#[test]
fn mapped_config_file_state() {
    let layout = PartitionLayout::new(16).expect("Valid");

    let specified = config(128, PersistentReuse, false);

    assert_eq!(NonExistent, specified.file_state(layout, None));
    assert_eq!(ExistsRightSize, specified.file_state(layout, Some(128)));
    assert_eq!(ExistsWrongSize, specified.file_state(layout, Some(144)));

    //  The header of 64 bytes occupies 4 partitions of 16 bytes.
    let derived = config(0, PersistentReuse, false);

    assert_eq!(ExistsWrongSize, derived.file_state(layout, Some(0)));
    assert_eq!(ExistsWrongSize, derived.file_state(layout, Some(64)));
    assert_eq!(ExistsRightSize, derived.file_state(layout, Some(80)));
    assert_eq!(ExistsWrongSize, derived.file_state(layout, Some(88)));
    assert_eq!(ExistsRightSize, derived.file_state(layout, Some(4096)));
}

} // mod tests
