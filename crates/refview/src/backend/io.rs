// Image I/O seam
//
// Decoding image data is not the shell's job. The shell only needs to know
// that a file named on the command line can be opened, and under what name
// the channel should list it. Openers run on pool workers.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::{Error, Result};

/// What the shell learns about a file it was asked to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// Display name, including any extension selector
    pub name: String,
    pub path: PathBuf,
    /// Selector from a `file[ext]` argument
    pub extension: Option<String>,
    pub size_bytes: u64,
}

pub trait ImageOpener: Send + Sync {
    fn open(&self, arg: &str) -> Result<ImageInfo>;
}

/// Split `frame.fits[1]` into (`frame.fits`, `Some("1")`).
pub fn split_extension(arg: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = arg.strip_suffix(']') {
        if let Some(open) = stripped.rfind('[') {
            return (&stripped[..open], Some(&stripped[open + 1..]));
        }
    }
    (arg, None)
}

/// Opener that only checks the file is there
#[derive(Debug, Clone, Copy, Default)]
pub struct FileProbe;

impl ImageOpener for FileProbe {
    fn open(&self, arg: &str) -> Result<ImageInfo> {
        let (file, extension) = split_extension(arg);
        let path = Path::new(file);
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(Error::NotFound(format!("{} is not a file", path.display())));
        }

        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        let name = match extension {
            Some(ext) => format!("{}[{}]", base, ext),
            None => base,
        };

        Ok(ImageInfo {
            name,
            path: path.to_path_buf(),
            extension: extension.map(str::to_string),
            size_bytes: meta.len(),
        })
    }
}
