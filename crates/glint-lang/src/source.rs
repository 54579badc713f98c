//! Source providers and the shared include cache.
//!
//! The pipeline never reads storage directly: `#include` targets are
//! requested from a [`SourceProvider`], and the cleaned per-file text is
//! memoized in an [`IncludeCache`] that can be shared across invocations
//! and worker threads.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Failure to produce the text of an include target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// External collaborator resolving include paths to text.
pub trait SourceProvider: Send + Sync {
    fn resolve(&self, path: &str) -> Result<String, SourceError>;
}

/// Hermetic in-memory provider, mostly for tests and embedding hosts.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    files: BTreeMap<String, String>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl SourceProvider for MemorySourceProvider {
    fn resolve(&self, path: &str) -> Result<String, SourceError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }
}

/// Provider reading files below a root directory.
///
/// Namespaced paths (`ns:path/to/file.glsl`) map to `root/ns/path/to/file.glsl`.
/// Paths escaping the root are reported as not found.
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, path: &str) -> Option<PathBuf> {
        let relative = match path.split_once(':') {
            Some((namespace, rest)) => Path::new(namespace).join(rest),
            None => PathBuf::from(path),
        };
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }
}

impl SourceProvider for FsSourceProvider {
    fn resolve(&self, path: &str) -> Result<String, SourceError> {
        let file = self
            .locate(path)
            .ok_or_else(|| SourceError::NotFound(path.to_string()))?;
        match std::fs::read_to_string(&file) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(path.to_string()))
            }
            Err(err) => Err(SourceError::Unreadable {
                path: path.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

/// One logical source line after splicing and comment removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based physical line where the logical line starts.
    pub number: usize,
    pub text: String,
}

/// A source file cleaned for preprocessing.
///
/// Comments are blanked out with spaces so columns keep pointing at the
/// authoring position, and `\`-newline continuations are joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub lines: Vec<SourceLine>,
    pub pragma_once: bool,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: &str) -> Self {
        let lines = strip_comments(splice_lines(text));
        let pragma_once = lines.iter().any(|line| {
            let trimmed = line.text.trim();
            trimmed
                .strip_prefix('#')
                .map(|rest| {
                    let mut words = rest.split_whitespace();
                    words.next() == Some("pragma") && words.next() == Some("once")
                })
                .unwrap_or(false)
        });
        Self {
            path: path.into(),
            lines,
            pragma_once,
        }
    }
}

fn splice_lines(text: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut pending: Option<SourceLine> = None;
    for (index, raw) in text.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let (body, continued) = match raw.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (raw, false),
        };
        let line = match pending.take() {
            Some(mut line) => {
                line.text.push_str(body);
                line
            }
            None => SourceLine {
                number: index + 1,
                text: body.to_string(),
            },
        };
        if continued {
            pending = Some(line);
        } else {
            lines.push(line);
        }
    }
    if let Some(line) = pending {
        lines.push(line);
    }
    lines
}

fn strip_comments(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut in_block = false;
    lines
        .into_iter()
        .map(|line| {
            let chars: Vec<char> = line.text.chars().collect();
            let mut out = String::with_capacity(line.text.len());
            let mut in_string = false;
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];
                let next = chars.get(i + 1).copied();
                if in_block {
                    if c == '*' && next == Some('/') {
                        in_block = false;
                        out.push_str("  ");
                        i += 2;
                    } else {
                        out.push(' ');
                        i += 1;
                    }
                    continue;
                }
                if in_string {
                    in_string = c != '"';
                    out.push(c);
                    i += 1;
                    continue;
                }
                match (c, next) {
                    ('/', Some('/')) => {
                        out.extend(std::iter::repeat(' ').take(chars.len() - i));
                        break;
                    }
                    ('/', Some('*')) => {
                        in_block = true;
                        out.push_str("  ");
                        i += 2;
                    }
                    ('"', _) => {
                        in_string = true;
                        out.push(c);
                        i += 1;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            SourceLine {
                number: line.number,
                text: out.trim_end().to_string(),
            }
        })
        .collect()
}

/// Resolve an include target relative to the including file.
///
/// Only `./` and `../` prefixed targets are relative; everything else is
/// passed to the provider unchanged.
pub fn resolve_include_path(including: &str, target: &str) -> String {
    if !(target.starts_with("./") || target.starts_with("../")) {
        return target.to_string();
    }
    let (namespace, including_path) = match including.split_once(':') {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, including),
    };
    let mut parts: Vec<&str> = including_path.split('/').collect();
    parts.pop();
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match namespace {
        Some(ns) => format!("{ns}:{joined}"),
        None => joined,
    }
}

/// Read-many, load-once cache of cleaned include files keyed by resolved path.
#[derive(Debug, Default)]
pub struct IncludeCache {
    entries: DashMap<String, Arc<SourceFile>>,
}

impl IncludeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `path`, asking `provider` only if no other caller loaded it yet.
    pub fn load(
        &self,
        path: &str,
        provider: &dyn SourceProvider,
    ) -> Result<Arc<SourceFile>, SourceError> {
        if let Some(hit) = self.entries.get(path) {
            tracing::trace!("include cache hit: {}", path);
            return Ok(Arc::clone(hit.value()));
        }
        let entry = self
            .entries
            .entry(path.to_string())
            .or_try_insert_with(|| {
                tracing::debug!("loading include {}", path);
                provider
                    .resolve(path)
                    .map(|text| Arc::new(SourceFile::new(path, &text)))
            })?;
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
