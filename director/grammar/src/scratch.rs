use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use tracing::{debug, warn};

const COLLISION_RETRIES: usize = 16;

/// Grammar text together with the file it was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarArtifact {
    /// Grammar source.
    pub text: String,
    /// Location handed to the inference backend.
    pub path: PathBuf,
}

/// Directory where per-directive grammar files are written.
///
/// File names are `<prefix>_<utc-micros>_<seq>.<ext>` and files are opened
/// with `create_new`, so concurrent directives never share a file. Stale
/// files are left to the host's temp-directory policy.
#[derive(Debug)]
pub struct GrammarScratch {
    dir: PathBuf,
    prefix: String,
    extension: String,
    sequence: AtomicU64,
}

impl GrammarScratch {
    /// Scratch directory with the default `tool_chooser_*.ebnf` naming.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_naming(dir, "tool_chooser", "ebnf")
    }

    /// Scratch directory with a custom file prefix and extension.
    #[must_use]
    pub fn with_naming(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `text` to a fresh file, creating the directory if needed.
    pub fn write(&self, text: impl Into<String>) -> io::Result<GrammarArtifact> {
        let text = text.into();
        fs::create_dir_all(&self.dir)?;
        let mut last_err = None;
        for _ in 0..COLLISION_RETRIES {
            let path = self.dir.join(self.next_name());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    fill(&path, file, &text)?;
                    debug!(path = %path.display(), bytes = text.len(), "grammar written");
                    return Ok(GrammarArtifact { text, path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)))
    }

    fn next_name(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let micros = Utc::now().timestamp_micros();
        format!("{}_{micros}_{seq}.{}", self.prefix, self.extension)
    }
}

/// Writes `text` through `sink`, removing the partial file at `path` when
/// the write fails.
fn fill(path: &Path, mut sink: impl Write, text: &str) -> io::Result<()> {
    if let Err(err) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
        drop(sink);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "partial grammar file left behind");
        }
        return Err(err);
    }
    Ok(())
}
