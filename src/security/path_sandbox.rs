//! Workspace path sandbox.
//!
//! # Responsibilities
//! - Resolve a client-supplied relative path against a trusted workspace root
//! - Reject traversal (`..`), absolute paths and oversized or null-byte input
//! - Reject symlinks that resolve outside the root
//! - Handle not-yet-existing files by checking the nearest existing ancestor
//!
//! # Data Flow
//! ```text
//! candidate: &str
//!     → check_path_syntax (null byte, length, segment normalisation, absolute)
//!     → probe(root)        (RootMissing)
//!     → join + containment (PathTraversal)
//!     → probe(joined)      (SymlinkEscape)
//!     → ancestor fallback  (ParentEscape)
//!     → PathBuf inside realpath(root)
//! ```
//!
//! # Design Decisions
//! - Containment is always component-wise (`/root-evil` is not under `/root`)
//! - `..` is checked per segment after normalisation, never as a substring
//! - Path existence is an explicit [`Probe`] value, not an I/O error branch

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::observability::metrics;

/// Maximum accepted candidate length, in characters.
pub const MAX_PATH_LENGTH: usize = 1000;

/// Reasons a candidate path is refused.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path contains a null byte")]
    NullByte,
    #[error("path exceeds {MAX_PATH_LENGTH} characters")]
    TooLong,
    #[error("path traversal detected")]
    PathTraversal,
    #[error("absolute paths are not allowed")]
    AbsolutePath,
    #[error("workspace root does not exist")]
    RootMissing,
    #[error("path resolves outside the workspace")]
    SymlinkEscape,
    #[error("parent directory resolves outside the workspace")]
    ParentEscape,
    /// Unexpected filesystem failure. Not a security rejection.
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
}

impl PathError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PathError::NullByte => "null_byte",
            PathError::TooLong => "too_long",
            PathError::PathTraversal => "path_traversal",
            PathError::AbsolutePath => "absolute_path",
            PathError::RootMissing => "root_missing",
            PathError::SymlinkEscape => "symlink_escape",
            PathError::ParentEscape => "parent_escape",
            PathError::Io(_) => "io",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PathError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_security_rejection(&self) -> bool {
        !matches!(self, PathError::Io(_))
    }
}

impl IntoResponse for PathError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_security_rejection() {
            self.to_string()
        } else {
            tracing::error!(error = %self, "Filesystem failure while resolving path");
            "Internal server error".to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Outcome of probing a path on the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The path exists; carries its realpath.
    Exists(PathBuf),
    /// The path is a symlink whose target does not exist.
    Dangling,
    NotFound,
}

/// Filesystem capability the sandbox depends on.
pub trait PathProbe: Send + Sync {
    fn probe(&self, path: &Path) -> impl Future<Output = io::Result<Probe>> + Send;
}

/// [`PathProbe`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl PathProbe for TokioFs {
    async fn probe(&self, path: &Path) -> io::Result<Probe> {
        match tokio::fs::canonicalize(path).await {
            Ok(real) => Ok(Probe::Exists(real)),
            Err(e) if is_missing(&e) => match tokio::fs::symlink_metadata(path).await {
                Ok(meta) if meta.file_type().is_symlink() => Ok(Probe::Dangling),
                Ok(_) => Ok(Probe::NotFound),
                Err(e) if is_missing(&e) => Ok(Probe::NotFound),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

fn is_missing(err: &io::Error) -> bool {
    // NotADirectory: a path component is a regular file.
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Sandbox bound to a [`PathProbe`] implementation.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSandbox<P = TokioFs> {
    probe: P,
}

impl WorkspaceSandbox<TokioFs> {
    pub fn new() -> Self {
        Self { probe: TokioFs }
    }
}

impl<P: PathProbe> WorkspaceSandbox<P> {
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }

    /// Resolve `candidate` against `root`, returning an absolute path that is
    /// guaranteed to lie within `realpath(root)`.
    pub async fn resolve(&self, root: &Path, candidate: &str) -> Result<PathBuf, PathError> {
        let result = self.resolve_inner(root, candidate).await;
        if let Err(e) = &result {
            if e.is_security_rejection() {
                tracing::warn!(kind = e.kind(), root = %root.display(), "Path rejected by sandbox");
                metrics::record_path_rejected(e.kind());
            }
        }
        result
    }

    async fn resolve_inner(&self, root: &Path, candidate: &str) -> Result<PathBuf, PathError> {
        let relative = check_path_syntax(candidate)?;

        let root_abs = absolutize(root)?;
        let real_root = match self.probe.probe(&root_abs).await? {
            Probe::Exists(real) => real,
            Probe::Dangling | Probe::NotFound => return Err(PathError::RootMissing),
        };

        let joined = if relative.as_os_str().is_empty() {
            root_abs.clone()
        } else {
            root_abs.join(&relative)
        };
        if !is_within(&root_abs, &joined) {
            return Err(PathError::PathTraversal);
        }

        match self.probe.probe(&joined).await? {
            Probe::Exists(real) => {
                if is_within(&real_root, &real) {
                    Ok(real)
                } else {
                    Err(PathError::SymlinkEscape)
                }
            }
            Probe::Dangling => Err(PathError::SymlinkEscape),
            Probe::NotFound => self.resolve_missing(&root_abs, &real_root, &joined).await,
        }
    }

    /// Target does not exist yet: anchor it on the nearest existing ancestor.
    async fn resolve_missing(
        &self,
        root_abs: &Path,
        real_root: &Path,
        joined: &Path,
    ) -> Result<PathBuf, PathError> {
        let mut pending: Vec<&std::ffi::OsStr> = Vec::new();
        let mut current = joined;

        while let (Some(parent), Some(name)) = (current.parent(), current.file_name()) {
            pending.push(name);
            if !is_within(root_abs, parent) {
                break;
            }
            match self.probe.probe(parent).await? {
                Probe::Exists(real_parent) => {
                    if !is_within(real_root, &real_parent) {
                        return Err(PathError::ParentEscape);
                    }
                    let mut resolved = real_parent;
                    resolved.extend(pending.iter().rev());
                    return Ok(resolved);
                }
                Probe::Dangling => return Err(PathError::ParentEscape),
                Probe::NotFound => current = parent,
            }
        }

        // Nothing along the chain could be probed; fall back to the lexical check.
        if is_within(root_abs, joined) {
            Ok(joined.to_path_buf())
        } else {
            Err(PathError::ParentEscape)
        }
    }
}

/// Resolve `candidate` against `root` using the real filesystem.
pub async fn resolve_safe_path(root: impl AsRef<Path>, candidate: &str) -> Result<PathBuf, PathError> {
    WorkspaceSandbox::new().resolve(root.as_ref(), candidate).await
}

/// Cheap syntactic pre-check with no filesystem access.
pub fn validate_path_syntax(candidate: &str) -> bool {
    check_path_syntax(candidate).is_ok()
}

/// Syntactic checks, returning the normalised relative path.
pub fn check_path_syntax(candidate: &str) -> Result<PathBuf, PathError> {
    if candidate.contains('\0') {
        return Err(PathError::NullByte);
    }
    if candidate.chars().count() > MAX_PATH_LENGTH {
        return Err(PathError::TooLong);
    }

    let unified = candidate.replace('\\', "/");
    let segments = normalize_segments(&unified);
    if segments.iter().any(|s| *s == "..") {
        return Err(PathError::PathTraversal);
    }

    if is_absolute_candidate(&unified) {
        return Err(PathError::AbsolutePath);
    }

    Ok(segments.iter().collect())
}

/// Collapse `.` and `..` segments lexically. Leading `..` that cannot be
/// cancelled are kept so the caller can see them.
fn normalize_segments(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if *last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

fn is_absolute_candidate(unified: &str) -> bool {
    let bytes = unified.as_bytes();
    if bytes.first() == Some(&b'/') {
        return true;
    }
    // Drive letter, e.g. `C:` or `c:/`.
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Absolute form of `path` with `.` and `..` collapsed lexically, so that it
/// can serve as the base for [`is_within`].
fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Component-wise containment: `target` equals `base` or lies beneath it.
///
/// Both paths must already be free of `.`/`..` components; anything else is
/// treated as outside.
pub fn is_within(base: &Path, target: &Path) -> bool {
    if target
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return false;
    }
    match target.strip_prefix(base) {
        Ok(rest) => !rest.is_absolute(),
        Err(_) => false,
    }
}
