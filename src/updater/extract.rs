//! Archive expansion.
//!
//! [`Unpacker`] is the archive-decoding capability; [`ZipUnpacker`] implements
//! it with the `zip` crate. Unpackers hand out a lazy iterator that writes one
//! file per `next()` call, so a caller can report progress per entry and stop
//! at the first failure. [`ArtifactExtractor`] drives that iterator and removes
//! whatever this run created when extraction fails part way.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::core::UpdaterError;

/// A file written by an unpacker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Absolute path of the written file.
    pub path: PathBuf,
    /// `false` when the write replaced an existing file.
    pub created: bool,
}

/// Lazy, finite, single-pass sequence of extracted entries.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<ExtractedEntry, UpdaterError>> + 'a>;

/// Archive-decoding capability.
pub trait Unpacker: Send + Sync {
    /// Open `bytes` as an archive rooted at `target`.
    ///
    /// Nothing is written until the returned iterator is advanced.
    fn entries<'a>(&self, bytes: &'a [u8], target: &Path) -> Result<EntryIter<'a>, UpdaterError>;
}

/// [`Unpacker`] for zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipUnpacker;

impl Unpacker for ZipUnpacker {
    fn entries<'a>(&self, bytes: &'a [u8], target: &Path) -> Result<EntryIter<'a>, UpdaterError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| UpdaterError::apply("extract", format!("not a valid archive: {e}")))?;
        debug!("Archive holds {} entries", archive.len());

        Ok(Box::new(ZipEntries {
            archive,
            index: 0,
            target: target.to_path_buf(),
        }))
    }
}

struct ZipEntries<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    index: usize,
    target: PathBuf,
}

impl ZipEntries<'_> {
    fn extract_at(&mut self, index: usize) -> Result<Option<ExtractedEntry>, UpdaterError> {
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| UpdaterError::apply("extract", format!("entry {index}: {e}")))?;

        let relative = file.enclosed_name().ok_or_else(|| {
            UpdaterError::apply("extract", format!("entry '{}' escapes the target directory", file.name()))
        })?;
        let outpath = self.target.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)
                .map_err(|e| UpdaterError::apply("extract", format!("{}: {e}", outpath.display())))?;
            return Ok(None);
        }

        let created = !outpath.exists();
        let mut write = || -> io::Result<()> {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;

            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))?;
            }
            Ok(())
        };

        match write() {
            Ok(()) => Ok(Some(ExtractedEntry {
                path: outpath,
                created,
            })),
            Err(e) => {
                // A half-written new file is removed right away
                if created {
                    let _ = fs::remove_file(&outpath);
                }
                Err(UpdaterError::apply("extract", format!("{}: {e}", outpath.display())))
            }
        }
    }
}

impl Iterator for ZipEntries<'_> {
    type Item = Result<ExtractedEntry, UpdaterError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;
            match self.extract_at(index) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    // Stop after the first failure
                    self.index = self.archive.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Expands downloaded archives into a directory.
#[derive(Debug, Clone, Default)]
pub struct ArtifactExtractor<U> {
    unpacker: U,
}

impl<U: Unpacker> ArtifactExtractor<U> {
    /// Wrap an unpacker.
    pub const fn new(unpacker: U) -> Self {
        Self {
            unpacker,
        }
    }

    /// Expand `bytes` into `target`, calling `on_entry` once per extracted file.
    ///
    /// On failure every file this call created is removed again. Files that
    /// existed before and were overwritten keep their new partial content, so
    /// callers must not assume a clean target after a failed run.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::FailedToApplyUpdate`] if `bytes` is not an archive or
    /// any entry cannot be written.
    pub fn extract(
        &self,
        bytes: &[u8],
        target: &Path,
        on_entry: &mut dyn FnMut(&Path),
    ) -> Result<Vec<PathBuf>, UpdaterError> {
        info!("Extracting archive into {}", target.display());
        fs::create_dir_all(target)
            .map_err(|e| UpdaterError::apply("extract", format!("{}: {e}", target.display())))?;

        let mut written: Vec<ExtractedEntry> = Vec::new();
        for entry in self.unpacker.entries(bytes, target)? {
            match entry {
                Ok(entry) => {
                    debug!("Extracted {}", entry.path.display());
                    on_entry(&entry.path);
                    written.push(entry);
                }
                Err(e) => {
                    warn!("Extraction failed: {e}");
                    Self::remove_created(&written);
                    return Err(e);
                }
            }
        }

        info!("Extracted {} files", written.len());
        Ok(written.into_iter().map(|entry| entry.path).collect())
    }

    fn remove_created(written: &[ExtractedEntry]) {
        for entry in written.iter().filter(|entry| entry.created) {
            if let Err(e) = fs::remove_file(&entry.path) {
                warn!("Could not remove partially extracted {}: {e}", entry.path.display());
            }
        }
        let kept = written.iter().filter(|entry| !entry.created).count();
        if kept > 0 {
            warn!("{kept} overwritten files were left in place");
        }
    }
}
