//! Path sandbox for the file tools.
//!
//! Every path a file tool touches goes through [`PathPolicy::resolve`]:
//! relative paths are anchored at the workspace, `~` is expanded, `..`
//! components are refused outright, and the resolved path must sit under
//! one of the allowed roots and outside every forbidden prefix.

use miniluma_core::error::ToolError;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Why a path was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathViolation {
    Traversal(String),
    OutsideRoots(String),
    Forbidden { path: String, prefix: String },
    Empty,
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Traversal(p) => write!(f, "Path traversal detected: {p}"),
            Self::OutsideRoots(p) => write!(f, "Path '{p}' is outside allowed directories"),
            Self::Forbidden { path, prefix } => {
                write!(f, "Access to '{path}' is forbidden (matches '{prefix}')")
            }
            Self::Empty => write!(f, "Path is empty"),
        }
    }
}

/// Allowed roots and forbidden prefixes for file access.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    workspace: PathBuf,
    roots: Vec<PathBuf>,
    forbidden: Vec<PathBuf>,
}

impl PathPolicy {
    /// A policy rooted at `workspace` only.
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        let workspace = normalize(workspace.as_ref());
        Self {
            roots: vec![workspace.clone()],
            workspace,
            forbidden: Vec::new(),
        }
    }

    /// Also allow access under `root`.
    pub fn allow(mut self, root: impl AsRef<Path>) -> Self {
        self.roots.push(normalize(root.as_ref()));
        self
    }

    /// Refuse anything under `prefix`, even inside an allowed root.
    pub fn forbid(mut self, prefix: impl AsRef<Path>) -> Self {
        self.forbidden.push(normalize(prefix.as_ref()));
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve `raw` to an absolute path the policy accepts.
    pub fn check(&self, raw: &str) -> Result<PathBuf, PathViolation> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PathViolation::Empty);
        }

        let expanded = expand_tilde(raw);
        if expanded.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathViolation::Traversal(raw.to_string()));
        }

        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        };
        let resolved = canonicalize_lenient(&absolute);

        if let Some(prefix) = self.forbidden.iter().find(|f| resolved.starts_with(f)) {
            return Err(PathViolation::Forbidden {
                path: raw.to_string(),
                prefix: prefix.display().to_string(),
            });
        }

        if !self.roots.iter().any(|root| resolved.starts_with(root)) {
            return Err(PathViolation::OutsideRoots(raw.to_string()));
        }

        Ok(resolved)
    }

    /// [`check`](Self::check), reported as a tool permission error.
    pub fn resolve(&self, tool_name: &str, raw: &str) -> Result<PathBuf, ToolError> {
        self.check(raw).map_err(|violation| match violation {
            PathViolation::Empty => ToolError::InvalidArguments("Path is empty".into()),
            other => ToolError::PermissionDenied {
                tool_name: tool_name.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match (path, home) {
        ("~", Some(home)) => PathBuf::from(home),
        (p, Some(home)) if p.starts_with("~/") => PathBuf::from(home).join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// Absolute, tilde-expanded and (where the path exists) canonical.
fn normalize(path: &Path) -> PathBuf {
    let expanded = expand_tilde(&path.to_string_lossy());
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };
    canonicalize_lenient(&absolute)
}

/// Canonicalize the deepest existing ancestor and re-attach the rest,
/// so paths about to be created still resolve symlinks above them.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path());
        let resolved = policy.check("notes/today.md").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("notes/today.md"));
    }

    #[test]
    fn parent_components_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path());
        assert!(matches!(policy.check("../etc/passwd"), Err(PathViolation::Traversal(_))));
        assert!(matches!(policy.check("a/../../b"), Err(PathViolation::Traversal(_))));
    }

    #[test]
    fn absolute_paths_outside_roots_are_refused() {
        let workspace = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("x.txt");
        let policy = PathPolicy::new(workspace.path());
        assert!(matches!(
            policy.check(outside.to_str().unwrap()),
            Err(PathViolation::OutsideRoots(_))
        ));

        let policy = policy.allow(other.path());
        assert!(policy.check(outside.to_str().unwrap()).is_ok());
    }

    #[test]
    fn forbidden_prefix_wins_over_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("secrets")).unwrap();
        let policy = PathPolicy::new(dir.path()).forbid(dir.path().join("secrets"));
        assert!(matches!(
            policy.check("secrets/key.pem"),
            Err(PathViolation::Forbidden { .. })
        ));
        assert!(policy.check("public/readme.md").is_ok());
    }

    #[test]
    fn tool_errors_carry_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path());
        match policy.resolve("read_file", "../x") {
            Err(ToolError::PermissionDenied { tool_name, reason }) => {
                assert_eq!(tool_name, "read_file");
                assert!(reason.contains("traversal"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            policy.resolve("read_file", "  "),
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
