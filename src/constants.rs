// src/constants.rs

/// Suffix of the per-project JSON file kept next to the project file
/// (the source-control-shareable format).
pub const PROJECT_FILE_SUFFIX: &str = ".argtree.json";

/// The name of the solution-private binary snapshot file.
pub const SNAPSHOT_FILENAME: &str = "argtree.snapshot.bin";

/// Current snapshot format version. Bumped whenever the record shape changes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 3;

/// Delimiter used for the command-line channel when a container does not
/// specify its own.
pub const DEFAULT_DELIMITER: &str = " ";
