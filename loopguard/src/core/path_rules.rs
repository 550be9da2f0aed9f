//! Deterministic matching of changed paths against policy entries.

/// File names treated as dependency manifests when a policy does not list its own.
pub const DEFAULT_DEPENDENCY_MANIFESTS: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "Pipfile",
    "Pipfile.lock",
    "Gemfile",
    "Gemfile.lock",
    "composer.json",
    "composer.lock",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "mix.exs",
    "mix.lock",
];

/// Match a single allow/deny entry against a candidate path.
///
/// - Entries ending in `/` are prefix matches (`src/` matches `src/a.rs`, not `srcx/a.rs`).
/// - Any other entry must equal the path exactly.
pub fn entry_matches(entry: &str, path: &str) -> bool {
    if entry.ends_with('/') {
        return path.starts_with(entry);
    }
    entry == path
}

/// True if any entry matches `path`.
pub fn matches_any<S: AsRef<str>>(entries: &[S], path: &str) -> bool {
    entries
        .iter()
        .any(|entry| entry_matches(entry.as_ref(), path))
}

/// True if the file name of `path` is one of `manifests`.
pub fn is_dependency_manifest<S: AsRef<str>>(path: &str, manifests: &[S]) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    manifests.iter().any(|manifest| manifest.as_ref() == name)
}

pub fn default_dependency_manifests() -> Vec<String> {
    DEFAULT_DEPENDENCY_MANIFESTS
        .iter()
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_entry_matches_nested_paths_only_under_directory() {
        assert!(entry_matches("src/", "src/a.ts"));
        assert!(entry_matches("src/", "src/b/c.ts"));
        assert!(!entry_matches("src/", "srcx/a.ts"));
        assert!(!entry_matches("src/", "lib/src/a.ts"));
    }

    #[test]
    fn exact_entry_requires_equal_path() {
        assert!(entry_matches("README.md", "README.md"));
        assert!(!entry_matches("README.md", "docs/README.md"));
        assert!(!entry_matches("src", "src/a.ts"));
    }

    #[test]
    fn manifest_detection_uses_file_name() {
        let manifests = default_dependency_manifests();
        assert!(is_dependency_manifest("package.json", &manifests));
        assert!(is_dependency_manifest("crates/app/Cargo.toml", &manifests));
        assert!(!is_dependency_manifest("src/package.json.md", &manifests));
        assert!(!is_dependency_manifest("docs/Cargo.toml/notes.md", &manifests));
    }
}
