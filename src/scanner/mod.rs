pub mod exclusions;
pub mod file_scanner;
pub mod mime;
pub mod mounts;
pub mod sources;

pub use mounts::{describe_mounts, list_mounts};
pub use sources::SourceLoader;
