//! Source archive resolution.
//!
//! An arXiv e-print is usually a (gzipped) tarball holding any number of
//! `.tex` files. This module decides which of them is the main document,
//! cleans every source file and assembles the main document with its
//! direct includes substituted.
//!
//! Main document selection, in order:
//!
//! 1. exactly one `.bbl` file whose stem matches a `.tex` member
//! 2. no `.bbl` file and exactly one `.tex` member
//! 3. the first `.tex` member (archive order) whose cleaned text
//!    contains `\begin{document}`

use crate::error::{DigestError, Result};
use crate::latex::{self, BBL_EXT, TEX_EXT};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Key under which the assembled main document is reported
pub const ASSEMBLED_KEY: &str = "all";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One cleaned `.tex` member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Cleaned sources of one paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceText {
    /// Cleaned `.tex` members in archive order
    pub files: Vec<SourceFile>,
    /// Name of the chosen main document
    pub main_document: Option<String>,
    /// Main document with includes substituted
    pub assembled: Option<String>,
}

impl SourceText {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.text.as_str())
    }

    /// Assembled document, or every file joined when no main document
    /// could be determined.
    pub fn full_text(&self) -> Cow<'_, str> {
        match &self.assembled {
            Some(text) => Cow::Borrowed(text),
            None => Cow::Owned(
                self.files
                    .iter()
                    .map(|f| f.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }

    /// Flat `{name -> text}` view with the assembled document under
    /// [`ASSEMBLED_KEY`] (`None` when assembly failed).
    pub fn to_map(&self) -> BTreeMap<String, Option<String>> {
        let mut map: BTreeMap<String, Option<String>> = self
            .files
            .iter()
            .map(|f| (f.name.clone(), Some(f.text.clone())))
            .collect();
        map.insert(ASSEMBLED_KEY.to_string(), self.assembled.clone());
        map
    }
}

/// Members of a downloaded source tarball, held only while resolving.
#[derive(Debug, Default)]
pub struct SourceArchive {
    /// `.tex` member names in archive order
    pub tex_files: Vec<String>,
    /// `.bbl` member names in archive order
    pub bbl_files: Vec<String>,
    tex_contents: Vec<(String, Vec<u8>)>,
}

impl SourceArchive {
    /// Open a tarball, gzipped or not.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::from_reader(GzDecoder::new(bytes))
        } else {
            Self::from_reader(bytes)
        }
    }

    fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut archive = tar::Archive::new(reader);
        let mut out = SourceArchive::default();

        let entries = archive
            .entries()
            .map_err(|e| DigestError::Archive(format!("not a tar archive: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| DigestError::Archive(format!("not a tar archive: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let raw_name = entry
                .path()
                .map_err(|e| DigestError::Archive(format!("bad member path: {}", e)))?
                .to_string_lossy()
                .into_owned();
            let name = raw_name
                .strip_prefix("./")
                .map(str::to_string)
                .unwrap_or(raw_name);

            if name.ends_with(TEX_EXT) {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                out.tex_files.push(name.clone());
                out.tex_contents.push((name, buf));
            } else if name.ends_with(BBL_EXT) {
                out.bbl_files.push(name);
            }
        }

        Ok(out)
    }

    /// Clean every source file and assemble the main document.
    ///
    /// `None` when the archive has no `.tex` member.
    pub fn resolve(self, arxiv_id: &str) -> Option<SourceText> {
        if self.tex_files.is_empty() {
            debug!(arxiv_id, "Failed to find main tex file: no tex file");
            return None;
        }

        let mut main = main_from_hints(&self.tex_files, &self.bbl_files, arxiv_id);
        if main.is_none() {
            debug!(
                arxiv_id,
                "Trying to choose tex file containing the document block as main tex file"
            );
        }

        let mut files = Vec::with_capacity(self.tex_contents.len());
        for (name, bytes) in self.tex_contents {
            let text = latex::clean_source(&String::from_utf8_lossy(&bytes));
            if main.is_none() && latex::has_document_body(&text) {
                debug!(arxiv_id, file = %name, "Choose file as main tex file");
                main = Some(name.clone());
            }
            files.push(SourceFile { name, text });
        }

        let assembled = match &main {
            Some(main_name) => {
                let lookup: HashMap<&str, &str> = files
                    .iter()
                    .map(|f| (f.name.as_str(), f.text.as_str()))
                    .collect();
                lookup
                    .get(main_name.as_str())
                    .map(|main_text| latex::expand_includes(main_text, &lookup))
            }
            None => {
                debug!(
                    arxiv_id,
                    "Failed to find main tex file: no tex file containing the document block"
                );
                None
            }
        };

        Some(SourceText {
            files,
            main_document: main,
            assembled,
        })
    }
}

/// Main document from file names alone (selection steps 1 and 2).
///
/// Several `.bbl` files are treated as no hint at all.
pub fn main_from_hints(tex_files: &[String], bbl_files: &[String], arxiv_id: &str) -> Option<String> {
    match bbl_files {
        [] if tex_files.len() == 1 => Some(tex_files[0].clone()),
        [] => {
            debug!(
                arxiv_id,
                "Cannot find main tex file from bbl: multiple tex files while no bbl file"
            );
            None
        }
        [bbl] => {
            let stem = bbl.strip_suffix(BBL_EXT).unwrap_or(bbl);
            let candidate = format!("{}{}", stem, TEX_EXT);
            if tex_files.contains(&candidate) {
                Some(candidate)
            } else {
                debug!(
                    arxiv_id,
                    bbl = %bbl,
                    "Cannot find main tex file from bbl: the bbl file does not match any tex file"
                );
                None
            }
        }
        _ => {
            debug!(
                arxiv_id,
                count = bbl_files.len(),
                "Cannot find main tex file from bbl: multiple bbl files"
            );
            None
        }
    }
}

/// Open and resolve a downloaded archive; any failure is an absent result.
pub fn resolve_archive(path: &Path, arxiv_id: &str) -> Option<SourceText> {
    match SourceArchive::open(path) {
        Ok(archive) => archive.resolve(arxiv_id),
        Err(e) => {
            debug!(arxiv_id, error = %e, "Failed to find main tex file: not a tar file");
            None
        }
    }
}
