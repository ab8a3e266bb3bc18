//! packdir: pack a folder (or file) into an archive, or unpack an archive
//! into a folder, on a dedicated worker thread with progress reporting and a
//! single classified terminal result.
//!
//! The interactive surface (a CLI here) owns at most one [`TaskHandle`] at a
//! time; everything underneath is blocking and synchronous.

pub mod models;
pub mod runner;
pub mod system;
pub mod utils;

pub use models::task::{TaskKind, TaskOutcome, TaskProgress};
pub use runner::{FinishedTask, TaskHandle};
pub use system::archive::{
    detect_archive_format, list_entries, ArchiveEntry, ArchiveFormat, PackRequest, UnpackRequest,
};
pub use system::resolve::{
    extract_dir_needs_confirmation, prepare_pack, prepare_unpack, suggested_destination,
};
pub use utils::error::{PackdirError, Result};
