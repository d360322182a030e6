//! Destination path containment.
//!
//! Client-supplied names are resolved lexically against a canonical root and
//! rejected if the result is the root itself or lies outside it. The deepest
//! ancestor that already exists on disk is canonicalized as well, so a
//! symlink inside the root cannot be used to write outside of it.

use crate::error::{Result, TransferError};
use std::path::{Component, Path, PathBuf};
use tracing::error;

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Build a guard around `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` to an absolute destination inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let joined = join_lexically(&self.root, name);

        let relative = match joined.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(_) => return Err(self.violation(name, &joined)),
        };
        match relative.components().next() {
            None | Some(Component::ParentDir) => return Err(self.violation(name, &joined)),
            Some(_) => {}
        }

        if let Some(existing) = deepest_existing_ancestor(&joined) {
            let canonical = std::fs::canonicalize(&existing)
                .map_err(|e| TransferError::io(format!("failed to resolve {}", existing.display()), e))?;
            if !canonical.starts_with(&self.root) {
                return Err(self.violation(name, &canonical));
            }
        }

        Ok(joined)
    }

    fn violation(&self, name: &str, resolved: &Path) -> TransferError {
        error!(
            name = %name,
            resolved = %resolved.display(),
            root = %self.root.display(),
            "file is outside root directory"
        );
        TransferError::PathViolation {
            name: name.to_string(),
        }
    }
}

/// Join `name` onto `root` and clean the result the way a path join does:
/// `.` segments vanish and `..` removes the previous segment. Absolute names
/// are treated as relative to the root.
fn join_lexically(root: &Path, name: &str) -> PathBuf {
    let mut joined = root.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::ParentDir => {
                joined.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    joined
}

fn deepest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| std::fs::symlink_metadata(p).is_ok())
        .map(Path::to_path_buf)
}
