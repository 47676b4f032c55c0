//! Repository name extraction from repository-relative source paths.
//!
//! The extractor runs a cascade of heuristics; the first one that
//! produces a name wins, and `unknown` is the sentinel when none does.

use crate::UNKNOWN_REPOSITORY;

const HOSTING_SERVICES: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

const PROJECT_MARKERS: &[&str] = &["src", "main", "test", "docs"];

const BUILD_FILES: &[&str] = &[
    "pom.xml",
    "build.gradle",
    "Cargo.toml",
    "go.mod",
    "package.json",
    "README",
    "README.md",
];

const COMMON_DIRS: &[&str] = &[
    "java",
    "com",
    "org",
    "net",
    "src",
    "main",
    "test",
    "tests",
    "docs",
    "build",
    "target",
    "out",
    "dist",
    "lib",
    "bin",
    "vendor",
    "node_modules",
];

/// Derive a repository name from a source path.
///
/// Cascade, first match wins:
/// 1. hosting-service segment followed by `owner/repo`;
/// 2. parent of a project-structure marker (`src`, `main`, `test`, `docs`);
/// 3. parent of a build file;
/// 4. trailing `owner/repo` directory pair;
/// 5. last valid segment.
pub fn repository_from_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return UNKNOWN_REPOSITORY.to_string();
    }

    if let Some(repo) = from_hosting_service(&segments) {
        return repo;
    }
    if let Some(repo) = from_project_structure(&segments) {
        return repo;
    }
    if let Some(repo) = from_build_file(&segments) {
        return repo;
    }

    // Directory segments only from here on; the trailing file name never
    // names a repository.
    let dirs: Vec<&str> = segments[..segments.len().saturating_sub(1)].to_vec();
    if let Some(repo) = from_owner_repo_pair(&dirs) {
        return repo;
    }
    dirs.iter()
        .rev()
        .find(|segment| is_valid_segment(segment))
        .map_or_else(|| UNKNOWN_REPOSITORY.to_string(), |s| (*s).to_string())
}

fn from_hosting_service(segments: &[&str]) -> Option<String> {
    let host_idx = segments
        .iter()
        .position(|segment| HOSTING_SERVICES.contains(segment))?;
    let owner = segments.get(host_idx + 1)?;
    let repo = segments.get(host_idx + 2)?;
    if owner.is_empty() || repo.contains('.') {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

fn from_project_structure(segments: &[&str]) -> Option<String> {
    let marker_idx = segments
        .iter()
        .position(|segment| PROJECT_MARKERS.contains(segment))?;
    if marker_idx == 0 {
        return None;
    }
    let parent = segments[marker_idx - 1];
    is_valid_segment(parent).then(|| parent.to_string())
}

fn from_build_file(segments: &[&str]) -> Option<String> {
    let build_idx = segments
        .iter()
        .position(|segment| BUILD_FILES.contains(segment))?;
    if build_idx == 0 {
        return None;
    }
    let parent = segments[build_idx - 1];
    is_valid_segment(parent).then(|| parent.to_string())
}

fn from_owner_repo_pair(dirs: &[&str]) -> Option<String> {
    if dirs.len() < 2 {
        return None;
    }
    let owner = dirs[dirs.len() - 2];
    let repo = dirs[dirs.len() - 1];
    (is_valid_segment(owner) && is_valid_segment(repo)).then(|| format!("{owner}/{repo}"))
}

/// A segment can name a repository when it is longer than one character,
/// carries no dot, and is not a conventional directory name.
fn is_valid_segment(segment: &str) -> bool {
    segment.len() > 1 && !segment.contains('.') && !COMMON_DIRS.contains(&segment)
}

#[cfg(test)]
mod tests {
    use super::repository_from_path;

    #[test]
    fn hosting_service_yields_owner_repo() {
        assert_eq!(
            repository_from_path("github.com/acme/widget/src/Main.java"),
            "acme/widget"
        );
        assert_eq!(
            repository_from_path("checkouts/gitlab.com/acme/widget/lib/a.py"),
            "acme/widget"
        );
    }

    #[test]
    fn project_structure_yields_marker_parent() {
        assert_eq!(repository_from_path("foo/bar/src/x.java"), "bar");
        assert_eq!(repository_from_path("foo/bar/docs/guide/x.md"), "bar");
    }

    #[test]
    fn equivalent_source_layouts_agree() {
        assert_eq!(
            repository_from_path("foo/bar/src/x.java"),
            repository_from_path("foo/bar/src/main/x.java")
        );
    }

    #[test]
    fn build_file_yields_its_parent() {
        assert_eq!(repository_from_path("tools/pom.xml"), "tools");
        assert_eq!(repository_from_path("mono/widget/Cargo.toml"), "widget");
    }

    #[test]
    fn owner_repo_tail_pair() {
        assert_eq!(repository_from_path("acme/widget/x.java"), "acme/widget");
    }

    #[test]
    fn fallback_takes_last_valid_segment() {
        assert_eq!(repository_from_path("com/widget/x.java"), "widget");
    }

    #[test]
    fn unknown_when_nothing_valid() {
        assert_eq!(repository_from_path("x.java"), "unknown");
        assert_eq!(repository_from_path(""), "unknown");
        assert_eq!(repository_from_path("a/x.java"), "unknown");
    }

    #[test]
    fn common_directory_names_are_skipped() {
        assert_eq!(repository_from_path("java/com/acme/x.java"), "acme");
    }

    proptest::proptest! {
        #[test]
        fn extraction_is_total_and_deterministic(path in ".{0,80}") {
            let first = repository_from_path(&path);
            let second = repository_from_path(&path);
            proptest::prop_assert_eq!(&first, &second);
            proptest::prop_assert!(!first.is_empty());
        }
    }
}
