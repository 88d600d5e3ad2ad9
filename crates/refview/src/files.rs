//! Command-line file arguments
//!
//! Wildcard arguments are expanded here, since a shell leaves patterns like
//! `frame*.fits[1]` alone because of the bracketed selector.

use std::path::{Component, Path, PathBuf};

use wildmatch::WildMatch;

fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Expand wildcard arguments; everything else passes through unchanged.
///
/// A bracketed suffix on a wildcard argument is reattached to every match.
/// Matches are sorted, and a pattern matching nothing expands to nothing.
pub fn expand_file_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    let mut expanded = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        if !has_wildcard(arg) {
            expanded.push(arg.to_string());
            continue;
        }

        let (pattern, suffix) = match arg.find('[') {
            Some(open) if arg.ends_with(']') => arg.split_at(open),
            _ => (arg, ""),
        };

        let matches = glob(pattern);
        if matches.is_empty() {
            tracing::warn!("No files match {}", arg);
        }
        for path in matches {
            expanded.push(format!("{}{}", path.display(), suffix));
        }
    }
    expanded
}

/// Match a path pattern one component at a time.
fn glob(pattern: &str) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::new()];

    for component in Path::new(pattern).components() {
        let part = match component {
            Component::Normal(part) => part.to_string_lossy().into_owned(),
            other => {
                for candidate in &mut candidates {
                    candidate.push(other.as_os_str());
                }
                continue;
            }
        };

        if !has_wildcard(&part) {
            for candidate in &mut candidates {
                candidate.push(&part);
            }
            continue;
        }

        let matcher = WildMatch::new(&part);
        let show_hidden = part.starts_with('.');
        let mut next = Vec::new();
        for dir in &candidates {
            let listing = if dir.as_os_str().is_empty() { Path::new(".") } else { dir.as_path() };
            let Ok(entries) = std::fs::read_dir(listing) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if (show_hidden || !name.starts_with('.')) && matcher.matches(&name) {
                    next.push(dir.join(&name));
                }
            }
        }
        candidates = next;
    }

    let mut found: Vec<PathBuf> = candidates.into_iter().filter(|p| p.exists()).collect();
    found.sort();
    found
}
