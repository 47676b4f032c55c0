//! Persisted per-repository indexing state.
//!
//! Incremental indexing needs to remember, per repository, which commit
//! was indexed last. State lives as pretty JSON under the state root,
//! keyed by a SHA-256 prefix of the repository URL so arbitrary URLs map
//! to safe file names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryState {
    pub url: String,
    pub default_branch: String,
    pub last_indexed_commit_sha: Option<String>,
    pub last_indexed_at_unix: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RepositoryCatalog {
    pub repositories: Vec<RepositoryState>,
}

pub fn save_repository_state(state_root: &Path, state: &RepositoryState) -> anyhow::Result<()> {
    let target = repository_state_file(state_root, &state.url);
    assert_state_write_target(state_root, &target)?;
    std::fs::create_dir_all(repositories_dir(state_root))?;
    std::fs::write(&target, serde_json::to_string_pretty(state)?)?;
    upsert_catalog_entry(state_root, state)?;
    Ok(())
}

pub fn load_repository_state(state_root: &Path, url: &str) -> Option<RepositoryState> {
    let file = repository_state_file(state_root, url);
    std::fs::read_to_string(file)
        .ok()
        .and_then(|raw| serde_json::from_str::<RepositoryState>(&raw).ok())
}

pub fn remove_repository_state(state_root: &Path, url: &str) -> anyhow::Result<()> {
    let file = repository_state_file(state_root, url);
    assert_state_write_target(state_root, &file)?;
    let _ = std::fs::remove_file(file);
    let mut catalog = read_catalog(state_root);
    catalog.repositories.retain(|entry| entry.url != url);
    write_catalog(state_root, &catalog)
}

pub fn read_catalog(state_root: &Path) -> RepositoryCatalog {
    let Ok(raw) = std::fs::read_to_string(catalog_file(state_root)) else {
        return RepositoryCatalog::default();
    };
    serde_json::from_str::<RepositoryCatalog>(&raw).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "unreadable repository catalog, starting empty");
        RepositoryCatalog::default()
    })
}

fn upsert_catalog_entry(state_root: &Path, state: &RepositoryState) -> anyhow::Result<()> {
    let mut catalog = read_catalog(state_root);
    if let Some(existing) = catalog
        .repositories
        .iter_mut()
        .find(|entry| entry.url == state.url)
    {
        *existing = state.clone();
    } else {
        catalog.repositories.push(state.clone());
        catalog.repositories.sort_by(|a, b| a.url.cmp(&b.url));
    }
    write_catalog(state_root, &catalog)
}

fn write_catalog(state_root: &Path, catalog: &RepositoryCatalog) -> anyhow::Result<()> {
    let target = catalog_file(state_root);
    assert_state_write_target(state_root, &target)?;
    std::fs::create_dir_all(state_root)?;
    std::fs::write(target, serde_json::to_string_pretty(catalog)?)?;
    Ok(())
}

pub fn repository_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..24].to_string()
}

fn repositories_dir(state_root: &Path) -> PathBuf {
    state_root.join("repositories")
}

fn repository_state_file(state_root: &Path, url: &str) -> PathBuf {
    repositories_dir(state_root).join(format!("{}.json", repository_key(url)))
}

fn catalog_file(state_root: &Path) -> PathBuf {
    state_root.join("repository-catalog.json")
}

fn assert_state_write_target(state_root: &Path, target: &Path) -> anyhow::Result<()> {
    if !target.starts_with(state_root) {
        anyhow::bail!(
            "unsafe write target outside state directory: {}",
            target.display()
        );
    }
    Ok(())
}
