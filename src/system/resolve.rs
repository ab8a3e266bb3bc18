//! Path-resolution policy for pack/unpack requests.
//!
//! Packing splits the user's source path into the `(parent, entry)` pair the
//! archiver needs so the produced archive carries `entry/` as its top-level
//! member, and strips the destination's canonical extension down to the base
//! name the archiver appends to. Unpacking validates the archive file and
//! prepares the destination directory.

use crate::system::archive::{ArchiveFormat, PackRequest, UnpackRequest};
use crate::utils::error::{PackdirError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Split a source path into `(parent_dir, entry_name)`.
///
/// A path with no usable base name (a filesystem root, `.`/`..`) is rejected
/// outright instead of guessing. A bare relative name has no parent; the
/// parent is then the current working directory, `.`, which is the one
/// convention this codebase commits to.
pub fn split_source(source: &Path) -> Result<(PathBuf, String)> {
    let Some(raw_name) = source.file_name() else {
        return Err(PackdirError::InvalidInput {
            reason: format!(
                "source '{}' has no base name to archive",
                source.display()
            ),
        });
    };
    let Some(entry_name) = raw_name.to_str() else {
        return Err(PackdirError::InvalidInput {
            reason: format!("source '{}' is not valid UTF-8", source.display()),
        });
    };

    let parent_dir = match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((parent_dir, entry_name.to_string()))
}

/// Strip the format's canonical extension (or a recognized alias) from the
/// end of `dest`, exactly once and case-insensitively. A destination without
/// the expected extension is used verbatim with a warning; the archiver
/// appends the canonical extension either way.
pub fn resolve_dest_base(dest: &Path, format: ArchiveFormat) -> PathBuf {
    let name = dest.to_string_lossy();
    let lower = name.to_lowercase();
    for suffix in format.matching_suffixes() {
        if lower.ends_with(suffix) && name.len() > suffix.len() {
            let cut = name.len() - suffix.len();
            return PathBuf::from(&name[..cut]);
        }
    }
    log::warn!(
        "destination '{}' does not end in '{}'; using it as the base name",
        dest.display(),
        format.canonical_extension()
    );
    dest.to_path_buf()
}

/// Suggested artifact path for a source: `<parent>/<entry><extension>`.
pub fn suggested_destination(source: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let (parent_dir, entry_name) = split_source(source)?;
    Ok(parent_dir.join(format!("{}{}", entry_name, format.canonical_extension())))
}

/// Validate a pack invocation and assemble the immutable request.
///
/// The source must exist, the destination base name's missing ancestors are
/// created here, and nothing is spawned if either step fails.
pub fn prepare_pack(source: &Path, dest: &Path, format: ArchiveFormat) -> Result<PackRequest> {
    if !source.exists() {
        return Err(PackdirError::InvalidInput {
            reason: format!("source '{}' does not exist", source.display()),
        });
    }

    let (root_dir, base_dir) = split_source(source)?;
    let dest_base = resolve_dest_base(dest, format);

    if let Some(parent) = dest_base.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| PackdirError::Filesystem {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }

    Ok(PackRequest {
        root_dir,
        base_dir,
        dest_base,
        format,
    })
}

/// Validate an unpack invocation and assemble the immutable request.
///
/// The archive must reference an existing file; the destination directory is
/// created if missing. Confirmation for a non-empty destination is the
/// caller's job, before this point.
pub fn prepare_unpack(archive: &Path, dest_dir: &Path) -> Result<UnpackRequest> {
    if !archive.is_file() {
        return Err(PackdirError::InvalidInput {
            reason: format!("'{}' is not an archive file", archive.display()),
        });
    }

    fs::create_dir_all(dest_dir).map_err(|e| PackdirError::Filesystem {
        path: dest_dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(UnpackRequest {
        archive_path: archive.to_path_buf(),
        dest_dir: dest_dir.to_path_buf(),
    })
}

/// True iff extracting into `dir` would land in an existing, non-empty
/// directory, the one case that needs the caller's explicit go-ahead.
pub fn extract_dir_needs_confirmation(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_source_dirname_basename() {
        let (parent, entry) = split_source(Path::new("/data/project")).expect("split");
        assert_eq!(parent, PathBuf::from("/data"));
        assert_eq!(entry, "project");
    }

    #[test]
    fn test_split_source_trailing_slash() {
        let (parent, entry) = split_source(Path::new("/data/project/")).expect("split");
        assert_eq!(parent, PathBuf::from("/data"));
        assert_eq!(entry, "project");
    }

    #[test]
    fn test_split_source_rejoins_to_input() {
        for raw in ["/data/project", "relative/dir/name", "./x/y"] {
            let source = Path::new(raw);
            let (parent, entry) = split_source(source).expect("split");
            assert_eq!(parent.join(&entry), source.components().collect::<PathBuf>());
        }
    }

    #[test]
    fn test_split_source_root_is_invalid_input() {
        let result = split_source(Path::new("/"));
        assert!(matches!(result, Err(PackdirError::InvalidInput { .. })));
    }

    #[test]
    fn test_split_source_dot_paths_are_invalid_input() {
        assert!(matches!(
            split_source(Path::new("..")),
            Err(PackdirError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_split_source_bare_name_falls_back_to_cwd() {
        let (parent, entry) = split_source(Path::new("project")).expect("split");
        assert_eq!(parent, PathBuf::from("."));
        assert_eq!(entry, "project");
    }

    #[test]
    fn test_resolve_dest_base_strips_canonical_extension() {
        let base = resolve_dest_base(Path::new("/out/project.tar.gz"), ArchiveFormat::TarGz);
        assert_eq!(base, PathBuf::from("/out/project"));
    }

    #[test]
    fn test_resolve_dest_base_is_case_insensitive() {
        let base = resolve_dest_base(Path::new("/out/project.TAR.GZ"), ArchiveFormat::TarGz);
        assert_eq!(base, PathBuf::from("/out/project"));
    }

    #[test]
    fn test_resolve_dest_base_strips_alias_extension() {
        let base = resolve_dest_base(Path::new("/out/project.tgz"), ArchiveFormat::TarGz);
        assert_eq!(base, PathBuf::from("/out/project"));
    }

    #[test]
    fn test_resolve_dest_base_strips_exactly_once() {
        let base = resolve_dest_base(Path::new("/out/a.tar.gz.tar.gz"), ArchiveFormat::TarGz);
        assert_eq!(base, PathBuf::from("/out/a.tar.gz"));
    }

    #[test]
    fn test_resolve_dest_base_missing_extension_used_verbatim() {
        let base = resolve_dest_base(Path::new("/out/project"), ArchiveFormat::Zip);
        assert_eq!(base, PathBuf::from("/out/project"));
    }

    #[test]
    fn test_resolve_dest_base_other_formats_extension_kept() {
        // A .zip destination for a tar.gz pack is "missing" the expected
        // extension; the archiver will append .tar.gz after it.
        let base = resolve_dest_base(Path::new("/out/project.zip"), ArchiveFormat::TarGz);
        assert_eq!(base, PathBuf::from("/out/project.zip"));
    }

    #[test]
    fn test_suggested_destination() {
        let suggested =
            suggested_destination(Path::new("/data/project"), ArchiveFormat::Zip).expect("suggest");
        assert_eq!(suggested, PathBuf::from("/data/project.zip"));
    }

    #[test]
    fn test_prepare_pack_missing_source_is_invalid_input() {
        let temp = tempdir().expect("create tempdir");
        let result = prepare_pack(
            &temp.path().join("missing"),
            &temp.path().join("out.zip"),
            ArchiveFormat::Zip,
        );
        assert!(matches!(result, Err(PackdirError::InvalidInput { .. })));
    }

    #[test]
    fn test_prepare_pack_creates_destination_ancestors() {
        let temp = tempdir().expect("create tempdir");
        let source = temp.path().join("project");
        std::fs::create_dir_all(&source).expect("create source");

        let dest = temp.path().join("deep").join("nested").join("project.zip");
        let request = prepare_pack(&source, &dest, ArchiveFormat::Zip).expect("prepare");

        assert!(temp.path().join("deep").join("nested").is_dir());
        assert_eq!(request.base_dir, "project");
        assert_eq!(request.root_dir, temp.path());
        assert_eq!(request.output_path(), dest);
    }

    #[test]
    fn test_prepare_unpack_rejects_non_file() {
        let temp = tempdir().expect("create tempdir");
        let result = prepare_unpack(&temp.path().join("gone.zip"), &temp.path().join("dest"));
        assert!(matches!(result, Err(PackdirError::InvalidInput { .. })));

        // A directory is not an archive file either.
        let result = prepare_unpack(temp.path(), &temp.path().join("dest"));
        assert!(matches!(result, Err(PackdirError::InvalidInput { .. })));
    }

    #[test]
    fn test_prepare_unpack_creates_destination() {
        let temp = tempdir().expect("create tempdir");
        let archive = temp.path().join("sample.zip");
        std::fs::write(&archive, b"stub").expect("write archive stub");

        let dest = temp.path().join("fresh").join("dest");
        let request = prepare_unpack(&archive, &dest).expect("prepare");
        assert!(dest.is_dir());
        assert_eq!(request.dest_dir, dest);
    }

    #[test]
    fn test_extract_dir_needs_confirmation() {
        let temp = tempdir().expect("create tempdir");

        // Missing directory: nothing to confirm.
        assert!(!extract_dir_needs_confirmation(&temp.path().join("absent")));

        // Empty directory: nothing to confirm.
        let empty = temp.path().join("empty");
        std::fs::create_dir_all(&empty).expect("create empty dir");
        assert!(!extract_dir_needs_confirmation(&empty));

        // Non-empty directory: requires the caller's go-ahead.
        std::fs::write(empty.join("occupied.txt"), b"x").expect("occupy dir");
        assert!(extract_dir_needs_confirmation(&empty));
    }
}
