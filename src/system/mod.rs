// System Layer
pub mod archive;
pub mod resolve;

pub use archive::{
    create_archive, detect_archive_format, extract_archive, list_entries, ArchiveEntry,
    ArchiveFormat, ArchiveProgressEvent, ArchiveSummary, PackRequest, UnpackRequest,
};
pub use resolve::{
    extract_dir_needs_confirmation, prepare_pack, prepare_unpack, resolve_dest_base, split_source,
    suggested_destination,
};
