use anyhow::{Context, Result, bail};
use portal_core::config::SenderConfig;
use portal_core::transfer::{FileSender, FileSource};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::info;
use walkdir::WalkDir;

use crate::connector::WsClientChannel;

/// Expand paths into the files to upload, in sending order.
///
/// A file is sent under its own name. A directory is walked recursively and
/// each file is named by its path relative to the directory's parent, so the
/// directory itself shows up on the receiving side. Symlinks found while
/// walking are skipped.
pub fn enumerate(paths: &[PathBuf]) -> Result<Vec<FileSource>> {
    let mut sources = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("cannot access {}", path.display()))?;

        if metadata.is_file() {
            sources.push(FileSource::from_path(path)?);
        } else if metadata.is_dir() {
            let dir = std::fs::canonicalize(path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            let base = dir.parent().unwrap_or(&dir).to_path_buf();

            let walker = WalkDir::new(&dir).follow_links(false).sort_by_file_name();
            for entry in walker {
                let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = relative_name(entry.path(), &base)?;
                sources.push(FileSource::new(entry.path(), name));
            }
        } else {
            bail!("{} is not a file or directory", path.display());
        }
    }

    Ok(sources)
}

/// `/`-separated name of `path` below `base`
fn relative_name(path: &Path, base: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(base)
        .with_context(|| format!("{} is outside {}", path.display(), base.display()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part
            .to_str()
            .with_context(|| format!("non UTF-8 file name: {}", path.display()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Upload `paths` to the server at `url`; returns the number of files sent
pub async fn upload(url: &str, paths: &[PathBuf], config: SenderConfig) -> Result<usize> {
    let files = enumerate(paths)?;
    if files.is_empty() {
        bail!("nothing to send");
    }

    let channel = WsClientChannel::connect(url).await?;
    let sender = FileSender::new(channel, config);
    let started = Instant::now();

    for source in &files {
        sender
            .transmit(source)
            .await
            .with_context(|| format!("failed to send {}", source.name))?;
    }
    sender.end().await.context("failed to finish session")?;

    info!(
        "Sent {} file(s) in {:.1}s",
        files.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(files.len())
}
