//! Search order for externally referenced files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::errstack::PauseGuard;

/// Placeholder in a prefix that stands for the referencing file's directory.
pub const ORIGIN_TOKEN: &str = "${ORIGIN}";

/// Separates entries of a prefix list, as in the platform's `PATH`.
pub const PREFIX_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// One candidate tried while opening an external file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAttempt {
    pub path: PathBuf,
    pub ok: bool,
}

/// Where to look besides the raw name.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SearchPaths<'a> {
    /// [`PREFIX_SEPARATOR`]-separated list from the environment.
    pub env_prefix: Option<&'a str>,
    /// Same form, from a property list.
    pub plist_prefix: Option<&'a str>,
    /// Directory of the referencing file.
    pub extpath: Option<&'a Path>,
    /// Resolved name of the referencing file.
    pub actual_name: Option<&'a str>,
}

fn expand_prefixes(list: &str, extpath: Option<&Path>, rel: &Path, out: &mut Vec<PathBuf>) {
    for prefix in list.split(PREFIX_SEPARATOR).filter(|p| !p.is_empty()) {
        let dir = match (prefix.strip_prefix(ORIGIN_TOKEN), extpath) {
            (Some(rest), Some(origin)) => {
                PathBuf::from(format!("{}{}", origin.display(), rest))
            }
            (Some(rest), None) => PathBuf::from(rest),
            (None, _) => PathBuf::from(prefix),
        };
        out.push(dir.join(rel));
    }
}

/// Candidate paths for `name`, in the order they are tried.
pub(crate) fn candidates(name: &str, paths: &SearchPaths<'_>) -> Vec<PathBuf> {
    let raw = Path::new(name);
    let mut out = Vec::new();
    // An absolute name is tried as given; later candidates use its last
    // component.
    let rel: PathBuf = if raw.is_absolute() {
        out.push(raw.to_path_buf());
        match raw.file_name() {
            Some(base) => PathBuf::from(base),
            None => return out,
        }
    } else {
        raw.to_path_buf()
    };
    if let Some(env) = paths.env_prefix {
        expand_prefixes(env, paths.extpath, &rel, &mut out);
    }
    if let Some(plist) = paths.plist_prefix {
        expand_prefixes(plist, paths.extpath, &rel, &mut out);
    }
    if let Some(ext) = paths.extpath {
        out.push(ext.join(&rel));
    }
    out.push(rel.clone());
    if let Some(dir) = paths.actual_name.and_then(|a| Path::new(a).parent()) {
        if !dir.as_os_str().is_empty() {
            out.push(dir.join(&rel));
        }
    }
    out
}

/// Try each candidate until `open` succeeds. Failures along the way are
/// not recorded on the error stack. Returns the opened value, if any, the
/// attempts made, and the last failure.
pub(crate) fn search<T>(
    cands: &[PathBuf],
    mut open: impl FnMut(&str) -> crate::error::Result<T>,
) -> (Option<T>, Vec<SearchAttempt>, Option<Error>) {
    let _pause = PauseGuard::new();
    let mut attempts = Vec::new();
    let mut last_err = None;
    for path in cands {
        let name = path.to_string_lossy();
        match open(&name) {
            Ok(v) => {
                debug!(path = %name, "external file found");
                attempts.push(SearchAttempt {
                    path: path.clone(),
                    ok: true,
                });
                return (Some(v), attempts, None);
            }
            Err(e) => {
                debug!(path = %name, error = %e, "external file candidate failed");
                attempts.push(SearchAttempt {
                    path: path.clone(),
                    ok: false,
                });
                last_err = Some(e);
            }
        }
    }
    (None, attempts, last_err)
}
