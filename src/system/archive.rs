use crate::utils::error::{classify_io, PackdirError, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use tar::{Archive as TarArchive, Builder as TarBuilder};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;
use zip::result::ZipError;
use zip::write::SimpleFileOptions as ZipFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

const ZSTD_LEVEL: i32 = 3;
const XZ_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 6] = [
        ArchiveFormat::Zip,
        ArchiveFormat::Tar,
        ArchiveFormat::TarGz,
        ArchiveFormat::TarBz2,
        ArchiveFormat::TarXz,
        ArchiveFormat::TarZst,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::TarZst => "tar.zst",
        }
    }

    /// File-name suffixes recognized for this format, canonical first.
    pub fn matching_suffixes(&self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::Zip => &[".zip"],
            ArchiveFormat::Tar => &[".tar"],
            ArchiveFormat::TarGz => &[".tar.gz", ".tgz"],
            ArchiveFormat::TarBz2 => &[".tar.bz2", ".tbz2"],
            ArchiveFormat::TarXz => &[".tar.xz", ".txz"],
            ArchiveFormat::TarZst => &[".tar.zst", ".tzst"],
        }
    }

    /// Extension the packing primitive appends to the destination base name.
    pub fn canonical_extension(&self) -> &'static str {
        self.matching_suffixes()[0]
    }

    /// Parse a user-supplied format name. Accepts the display name, any
    /// recognized suffix without its leading dot, and the `gztar`-style
    /// names some platforms use for the compressed tar variants.
    pub fn parse(value: &str) -> Option<ArchiveFormat> {
        let v = value.trim().to_lowercase();
        ArchiveFormat::ALL.into_iter().find(|f| {
            f.display_name() == v
                || f.matching_suffixes()
                    .iter()
                    .any(|s| s.trim_start_matches('.') == v)
                || matches!(
                    (f, v.as_str()),
                    (ArchiveFormat::TarGz, "gztar")
                        | (ArchiveFormat::TarBz2, "bztar")
                        | (ArchiveFormat::TarXz, "xztar")
                )
        })
    }
}

/// Fully-resolved packing request. Immutable once the task starts.
#[derive(Debug, Clone)]
pub struct PackRequest {
    /// Directory handed to the archiver as the walk root (the source's parent).
    pub root_dir: PathBuf,
    /// Entry archived under `root_dir`; becomes the archive's top-level member.
    pub base_dir: String,
    /// Destination path without the canonical extension.
    pub dest_base: PathBuf,
    pub format: ArchiveFormat,
}

impl PackRequest {
    /// Final artifact path: the base name with the canonical extension appended.
    pub fn output_path(&self) -> PathBuf {
        let mut raw = self.dest_base.clone().into_os_string();
        raw.push(self.format.canonical_extension());
        PathBuf::from(raw)
    }
}

/// Fully-resolved unpacking request. Immutable once the task starts.
#[derive(Debug, Clone)]
pub struct UnpackRequest {
    pub archive_path: PathBuf,
    pub dest_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct ArchiveProgressEvent {
    pub current_entry: String,
    pub entries_completed: usize,
    pub total_entries: usize,
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveSummary {
    pub entries_written: usize,
    pub bytes_processed: u64,
}

#[derive(Debug, Clone)]
struct ArchiveSourceItem {
    source_path: PathBuf,
    archive_path: PathBuf,
    is_dir: bool,
    size: u64,
}

pub fn detect_archive_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    ArchiveFormat::ALL.into_iter().find(|format| {
        format
            .matching_suffixes()
            .iter()
            .any(|suffix| name.ends_with(suffix) && name.len() > suffix.len())
    })
}

/// Create the archive described by `request`, reporting progress per entry.
///
/// The tree rooted at `root_dir/base_dir` is stored under archive paths
/// beginning with `base_dir`, so the artifact's sole top-level member is the
/// source's own name. An existing file at the output path is overwritten.
pub fn create_archive(
    request: &PackRequest,
    progress_tx: Sender<ArchiveProgressEvent>,
) -> Result<ArchiveSummary> {
    let source_root = request.root_dir.join(&request.base_dir);
    if !source_root.exists() {
        return Err(PackdirError::NotFound { path: source_root });
    }

    let items = collect_source_items(&source_root, Path::new(&request.base_dir))?;
    let total_entries = items.len();
    let total_bytes = items.iter().map(|i| i.size).sum::<u64>();
    let mut summary = ArchiveSummary::default();

    send_progress(&progress_tx, String::new(), 0, total_entries, 0, total_bytes);

    let output_path = request.output_path();
    let file = File::create(&output_path).map_err(|e| classify_io(e, &output_path))?;

    match request.format {
        ArchiveFormat::Zip => {
            let mut writer = ZipWriter::new(file);
            append_zip_items(
                &mut writer,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            writer
                .finish()
                .map_err(|e| map_zip_write_error(&output_path, e))?;
        }
        ArchiveFormat::Tar => {
            let mut builder = TarBuilder::new(file);
            append_tar_items(
                &mut builder,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            builder.finish().map_err(|e| classify_io(e, &output_path))?;
        }
        ArchiveFormat::TarGz => {
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = TarBuilder::new(encoder);
            append_tar_items(
                &mut builder,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            let encoder = builder
                .into_inner()
                .map_err(|e| classify_io(e, &output_path))?;
            encoder.finish().map_err(|e| classify_io(e, &output_path))?;
        }
        ArchiveFormat::TarBz2 => {
            let encoder = BzEncoder::new(file, bzip2::Compression::default());
            let mut builder = TarBuilder::new(encoder);
            append_tar_items(
                &mut builder,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            let encoder = builder
                .into_inner()
                .map_err(|e| classify_io(e, &output_path))?;
            encoder.finish().map_err(|e| classify_io(e, &output_path))?;
        }
        ArchiveFormat::TarXz => {
            let encoder = XzEncoder::new(file, XZ_LEVEL);
            let mut builder = TarBuilder::new(encoder);
            append_tar_items(
                &mut builder,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            let encoder = builder
                .into_inner()
                .map_err(|e| classify_io(e, &output_path))?;
            encoder.finish().map_err(|e| classify_io(e, &output_path))?;
        }
        ArchiveFormat::TarZst => {
            let encoder =
                ZstdEncoder::new(file, ZSTD_LEVEL).map_err(|e| classify_io(e, &output_path))?;
            let mut builder = TarBuilder::new(encoder);
            append_tar_items(
                &mut builder,
                &items,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
            let encoder = builder
                .into_inner()
                .map_err(|e| classify_io(e, &output_path))?;
            encoder.finish().map_err(|e| classify_io(e, &output_path))?;
        }
    }

    Ok(summary)
}

/// Expand the archive into `dest_dir`, reporting progress per entry.
///
/// The destination must already exist; entries escaping it (absolute paths,
/// `..` components) fail the extraction. Existing files are replaced.
pub fn extract_archive(
    request: &UnpackRequest,
    progress_tx: Sender<ArchiveProgressEvent>,
) -> Result<ArchiveSummary> {
    let format = detect_archive_format(&request.archive_path).ok_or_else(|| {
        PackdirError::Format {
            path: request.archive_path.clone(),
            reason: "unrecognized archive extension".to_string(),
        }
    })?;

    if !request.dest_dir.is_dir() {
        return Err(PackdirError::Filesystem {
            path: request.dest_dir.clone(),
            reason: "destination directory does not exist".to_string(),
        });
    }

    // Listing pass doubles as a corruption check and yields the totals.
    let entries = list_entries(&request.archive_path)?;
    let total_entries = entries.len();
    let total_bytes = entries.iter().map(|e| e.size).sum::<u64>();
    let mut summary = ArchiveSummary::default();

    send_progress(&progress_tx, String::new(), 0, total_entries, 0, total_bytes);

    match format {
        ArchiveFormat::Zip => extract_zip_entries(
            request,
            &progress_tx,
            &mut summary,
            total_entries,
            total_bytes,
        )?,
        _ => {
            let reader = open_tar_reader(&request.archive_path, format)?;
            extract_tar_entries(
                TarArchive::new(reader),
                request,
                &progress_tx,
                &mut summary,
                total_entries,
                total_bytes,
            )?;
        }
    }

    Ok(summary)
}

/// List every member of the archive at `path`.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let format = detect_archive_format(path).ok_or_else(|| PackdirError::Format {
        path: path.to_path_buf(),
        reason: "unrecognized archive extension".to_string(),
    })?;

    match format {
        ArchiveFormat::Zip => list_zip_entries(path),
        _ => list_tar_entries(TarArchive::new(open_tar_reader(path, format)?), path),
    }
}

fn collect_source_items(source_root: &Path, archive_root: &Path) -> Result<Vec<ArchiveSourceItem>> {
    let mut items = Vec::new();
    collect_source_item_recursive(source_root, archive_root, &mut items)?;
    Ok(items)
}

fn collect_source_item_recursive(
    source_path: &Path,
    archive_path: &Path,
    out: &mut Vec<ArchiveSourceItem>,
) -> Result<()> {
    let meta = fs::symlink_metadata(source_path).map_err(|e| classify_io(e, source_path))?;
    if meta.is_dir() {
        out.push(ArchiveSourceItem {
            source_path: source_path.to_path_buf(),
            archive_path: archive_path.to_path_buf(),
            is_dir: true,
            size: 0,
        });
        for entry in fs::read_dir(source_path).map_err(|e| classify_io(e, source_path))? {
            let entry = entry.map_err(|e| classify_io(e, source_path))?;
            let child_source = entry.path();
            let child_archive = archive_path.join(entry.file_name());
            collect_source_item_recursive(&child_source, &child_archive, out)?;
        }
    } else {
        out.push(ArchiveSourceItem {
            source_path: source_path.to_path_buf(),
            archive_path: archive_path.to_path_buf(),
            is_dir: false,
            size: meta.len(),
        });
    }
    Ok(())
}

/// Forward-slash entry name regardless of host separators.
fn archive_entry_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(v) => Some(v.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn send_progress(
    progress_tx: &Sender<ArchiveProgressEvent>,
    current_entry: String,
    entries_completed: usize,
    total_entries: usize,
    bytes_processed: u64,
    total_bytes: u64,
) {
    let _ = progress_tx.send(ArchiveProgressEvent {
        current_entry,
        entries_completed,
        total_entries,
        bytes_processed,
        total_bytes,
    });
}

fn map_zip_write_error(path: &Path, error: ZipError) -> PackdirError {
    match error {
        ZipError::Io(e) => classify_io(e, path),
        other => PackdirError::Unknown {
            reason: other.to_string(),
        },
    }
}

fn map_zip_read_error(path: &Path, error: ZipError) -> PackdirError {
    match error {
        ZipError::Io(e) => classify_io(e, path),
        other => PackdirError::Format {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn append_zip_items(
    writer: &mut ZipWriter<File>,
    items: &[ArchiveSourceItem],
    progress_tx: &Sender<ArchiveProgressEvent>,
    summary: &mut ArchiveSummary,
    total_entries: usize,
    total_bytes: u64,
) -> Result<()> {
    let options = ZipFileOptions::default().compression_method(CompressionMethod::Deflated);

    for item in items {
        let mut name = archive_entry_name(&item.archive_path);
        if item.is_dir {
            if !name.ends_with('/') {
                name.push('/');
            }
            writer
                .add_directory(name.clone(), options)
                .map_err(|e| map_zip_write_error(&item.source_path, e))?;
        } else {
            writer
                .start_file(name.clone(), options)
                .map_err(|e| map_zip_write_error(&item.source_path, e))?;
            let mut src = File::open(&item.source_path).map_err(|e| classify_io(e, &item.source_path))?;
            let copied = io::copy(&mut src, writer).map_err(|e| classify_io(e, &item.source_path))?;
            summary.bytes_processed += copied;
        }

        summary.entries_written += 1;
        send_progress(
            progress_tx,
            name,
            summary.entries_written,
            total_entries,
            summary.bytes_processed,
            total_bytes,
        );
    }
    Ok(())
}

fn append_tar_items<W: Write>(
    builder: &mut TarBuilder<W>,
    items: &[ArchiveSourceItem],
    progress_tx: &Sender<ArchiveProgressEvent>,
    summary: &mut ArchiveSummary,
    total_entries: usize,
    total_bytes: u64,
) -> Result<()> {
    for item in items {
        let name = archive_entry_name(&item.archive_path);
        if item.is_dir {
            builder
                .append_dir(&name, &item.source_path)
                .map_err(|e| classify_io(e, &item.source_path))?;
        } else {
            let mut src = File::open(&item.source_path).map_err(|e| classify_io(e, &item.source_path))?;
            builder
                .append_file(&name, &mut src)
                .map_err(|e| classify_io(e, &item.source_path))?;
            summary.bytes_processed += item.size;
        }

        summary.entries_written += 1;
        send_progress(
            progress_tx,
            name,
            summary.entries_written,
            total_entries,
            summary.bytes_processed,
            total_bytes,
        );
    }
    Ok(())
}

fn open_tar_reader(path: &Path, format: ArchiveFormat) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| classify_io(e, path))?;
    Ok(match format {
        ArchiveFormat::Tar => Box::new(file),
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(file)),
        ArchiveFormat::TarXz => Box::new(XzDecoder::new(file)),
        ArchiveFormat::TarZst => Box::new(ZstdDecoder::new(file).map_err(|e| classify_io(e, path))?),
        ArchiveFormat::Zip => unreachable!("zip uses its own reader"),
    })
}

fn extract_zip_entries(
    request: &UnpackRequest,
    progress_tx: &Sender<ArchiveProgressEvent>,
    summary: &mut ArchiveSummary,
    total_entries: usize,
    total_bytes: u64,
) -> Result<()> {
    let file = File::open(&request.archive_path).map_err(|e| classify_io(e, &request.archive_path))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| map_zip_read_error(&request.archive_path, e))?;

    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|e| map_zip_read_error(&request.archive_path, e))?;
        let name = entry.name().to_string();
        let raw_path = PathBuf::from(&name);
        let dest_path = sanitize_extract_path(&request.dest_dir, &raw_path).ok_or_else(|| {
            PackdirError::Format {
                path: request.archive_path.clone(),
                reason: format!("entry '{}' escapes the destination", name),
            }
        })?;

        if entry.is_dir() {
            ensure_dir(&dest_path)?;
        } else {
            replace_existing(&dest_path)?;
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| classify_io(e, parent))?;
            }
            let mut out = File::create(&dest_path).map_err(|e| classify_io(e, &dest_path))?;
            io::copy(&mut entry, &mut out).map_err(|e| classify_io(e, &request.archive_path))?;
            summary.bytes_processed += entry.size();
        }

        summary.entries_written += 1;
        send_progress(
            progress_tx,
            name,
            summary.entries_written,
            total_entries,
            summary.bytes_processed,
            total_bytes,
        );
    }
    Ok(())
}

fn extract_tar_entries<R: Read>(
    mut archive: TarArchive<R>,
    request: &UnpackRequest,
    progress_tx: &Sender<ArchiveProgressEvent>,
    summary: &mut ArchiveSummary,
    total_entries: usize,
    total_bytes: u64,
) -> Result<()> {
    for entry_result in archive
        .entries()
        .map_err(|e| classify_io(e, &request.archive_path))?
    {
        let mut entry = entry_result.map_err(|e| classify_io(e, &request.archive_path))?;
        let raw_path = entry
            .path()
            .map_err(|e| classify_io(e, &request.archive_path))?
            .into_owned();
        let name = archive_entry_name(&raw_path);
        let is_dir = entry.header().entry_type().is_dir();
        let dest_path = sanitize_extract_path(&request.dest_dir, &raw_path).ok_or_else(|| {
            PackdirError::Format {
                path: request.archive_path.clone(),
                reason: format!("entry '{}' escapes the destination", name),
            }
        })?;

        if is_dir {
            ensure_dir(&dest_path)?;
        } else {
            replace_existing(&dest_path)?;
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| classify_io(e, parent))?;
            }
            let size = entry.size();
            entry
                .unpack(&dest_path)
                .map_err(|e| classify_io(e, &request.archive_path))?;
            summary.bytes_processed += size;
        }

        summary.entries_written += 1;
        send_progress(
            progress_tx,
            name,
            summary.entries_written,
            total_entries,
            summary.bytes_processed,
            total_bytes,
        );
    }
    Ok(())
}

fn list_zip_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).map_err(|e| classify_io(e, path))?;
    let mut archive = ZipArchive::new(file).map_err(|e| map_zip_read_error(path, e))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| map_zip_read_error(path, e))?;
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            size: entry.size(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(entries)
}

fn list_tar_entries<R: Read>(mut archive: TarArchive<R>, src: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for entry_result in archive.entries().map_err(|e| classify_io(e, src))? {
        let entry = entry_result.map_err(|e| PackdirError::Format {
            path: src.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path().map_err(|e| PackdirError::Format {
            path: src.to_path_buf(),
            reason: e.to_string(),
        })?;
        entries.push(ArchiveEntry {
            path: archive_entry_name(&path),
            size: entry.size(),
            is_dir: entry.header().entry_type().is_dir(),
        });
    }
    Ok(entries)
}

fn ensure_dir(dest_path: &Path) -> Result<()> {
    if !dest_path.is_dir() {
        replace_existing(dest_path)?;
        fs::create_dir_all(dest_path).map_err(|e| classify_io(e, dest_path))?;
    }
    Ok(())
}

fn replace_existing(dest_path: &Path) -> Result<()> {
    if dest_path.is_dir() {
        fs::remove_dir_all(dest_path).map_err(|e| classify_io(e, dest_path))?;
    } else if dest_path.symlink_metadata().is_ok() {
        fs::remove_file(dest_path).map_err(|e| classify_io(e, dest_path))?;
    }
    Ok(())
}

fn sanitize_extract_path(dest_root: &Path, raw_path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for comp in raw_path.components() {
        match comp {
            Component::Normal(v) => clean.push(v),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let out = dest_root.join(clean);
    if out.starts_with(dest_root) {
        Some(out)
    } else {
        None
    }
}
