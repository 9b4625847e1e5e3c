//! Pure path normalization over a working directory.
//!
//! Resolution never touches storage. Results are always absolute, contain no
//! `.`/`..` or empty segments, and only end in `/` when they are the root.

use crate::error::{Error, Result};

/// The workspace root.
pub const ROOT: &str = "/";

/// Resolve `raw` against `cwd` into a normalized absolute path.
///
/// `..` at the root stays at the root; doubled separators collapse.
pub fn resolve(cwd: &str, raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(Error::InvalidPath("path contains a NUL byte".to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    if !raw.starts_with('/') {
        segments.extend(cwd.split('/').filter(|s| !s.is_empty()));
    }

    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    Ok(join(&segments))
}

/// True when `path` is already in resolved form.
pub fn is_normalized(path: &str) -> bool {
    if path == ROOT {
        return true;
    }
    path.starts_with('/')
        && !path.ends_with('/')
        && !path.contains('\0')
        && path[1..]
            .split('/')
            .all(|s| !s.is_empty() && s != "." && s != "..")
}

/// Reject anything that is not a resolved path.
pub(crate) fn check(path: &str) -> Result<()> {
    if is_normalized(path) {
        Ok(())
    } else {
        Err(Error::InvalidPath(format!("not a normalized absolute path: {path:?}")))
    }
}

fn join(segments: &[&str]) -> String {
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Last segment of a normalized path; the root's name is `/`.
pub fn file_name(path: &str) -> &str {
    if path == ROOT {
        return ROOT;
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a child name onto a normalized directory path.
pub fn child(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// True when `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Every proper ancestor of `path` from the root down, excluding the root.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return out;
    }
    for segment in &segments[..segments.len() - 1] {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}
