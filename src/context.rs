//! Per-evaluation context handed to a [`RuleSetFactory`](crate::RuleSetFactory).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What the engine knows about the entity being resolved.
///
/// `name` is the string that gets tokenized; `path` and `directory` are only
/// there for rules that want more than the name itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    name: String,
    path: Option<PathBuf>,
    directory: Option<String>,
}

impl EvaluationContext {
    /// Context for a bare name with no file system location.
    pub fn from_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyArgument { name: "name" });
        }
        Ok(EvaluationContext { name, path: None, directory: None })
    }

    /// Context for a file: the name is the file stem, the directory is the
    /// name of the parent directory.
    ///
    /// ```text
    /// /media/Some Title/Some Title v01.cbz
    ///   name:      "Some Title v01"
    ///   directory: "Some Title"
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or(Error::EmptyArgument { name: "path" })?;
        let directory = path
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned());

        Ok(EvaluationContext { name, path: Some(path.to_path_buf()), directory })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Name of the directory containing the file, when known.
    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }
}
