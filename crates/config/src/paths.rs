//! Filesystem facts derived from the environment and the data directory:
//! where the database lives, how big it is, and how much JSON the data
//! directory holds.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;

use crate::{EnvConfig, NodeEnv};

pub const DEFAULT_DB_FILE: &str = "promptcraft.db";

/// Returns the SQLite file path of a `file:` url, without any query string.
pub fn sqlite_path_from_url(url: &str) -> Option<&str> {
    let rest = url.trim().strip_prefix("file:")?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then_some(path)
}

pub fn database_url_scheme(url: &str) -> Option<&str> {
    url.split_once(':').map(|(scheme, _)| scheme)
}

/// Resolves where the database file lives.
///
/// An explicit `DATABASE_URL` wins; relative paths are anchored at the data
/// directory when there is one. Without a url the database sits inside the
/// data directory. `None` means the database location is not configured.
pub fn resolve_database_path(
    database_url: Option<&str>,
    data_dir: Option<&Path>,
) -> Option<PathBuf> {
    match database_url {
        Some(url) => {
            let raw = Path::new(sqlite_path_from_url(url)?);
            if raw.is_absolute() {
                return Some(raw.to_path_buf());
            }
            Some(match data_dir {
                Some(dir) => dir.join(raw),
                None => raw.to_path_buf(),
            })
        }
        None => data_dir.map(|dir| dir.join(DEFAULT_DB_FILE)),
    }
}

/// Folds `.` and `..` without touching the filesystem, so the result does
/// not depend on the paths existing yet.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DbInfo {
    pub database_url_scheme: Option<String>,
    pub path: Option<String>,
    pub exists: bool,
    pub size_bytes: u64,
}

pub fn db_info(database_url: Option<&str>, data_dir: Option<&Path>) -> DbInfo {
    let path = resolve_database_path(database_url, data_dir);
    let size_bytes = path
        .as_deref()
        .and_then(|p| fs::metadata(p).ok())
        .map(|meta| meta.len());

    DbInfo {
        database_url_scheme: database_url
            .and_then(database_url_scheme)
            .map(ToString::to_string),
        path: path.map(|p| p.to_string_lossy().to_string()),
        exists: size_bytes.is_some(),
        size_bytes: size_bytes.unwrap_or(0),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataDirUsage {
    pub data_dir: String,
    pub json_files: u64,
    pub total_bytes: u64,
}

/// Sums the size of every `*.json` file below `dir`.
pub fn data_dir_usage(dir: &Path) -> Result<DataDirUsage> {
    let mut json_files = 0;
    let mut total_bytes = 0;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            continue;
        }
        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        json_files += 1;
        total_bytes += meta.len();
    }

    Ok(DataDirUsage {
        data_dir: dir.to_string_lossy().to_string(),
        json_files,
        total_bytes,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvSafety {
    pub node_env: NodeEnv,
    pub skip_env_validation: bool,
    pub database_url_set: bool,
    pub database_inside_data_dir: bool,
    pub warnings: Vec<String>,
}

pub fn env_safety(env: &EnvConfig, data_dir: Option<&Path>) -> EnvSafety {
    let mut warnings = Vec::new();
    let database_url = env.database_url.as_deref();
    let db_path = resolve_database_path(database_url, data_dir);

    let database_inside_data_dir = match (&db_path, data_dir) {
        (Some(db), Some(dir)) => normalize_lexically(db).starts_with(normalize_lexically(dir)),
        _ => false,
    };

    if env.skip_env_validation {
        warnings.push("SKIP_ENV_VALIDATION is set; environment checks are bypassed".to_string());
    }
    if let Some(url) = database_url {
        if sqlite_path_from_url(url).is_none() {
            warnings.push("DATABASE_URL is not a `file:` SQLite url".to_string());
        } else if data_dir.is_some() && !database_inside_data_dir {
            warnings.push("DATABASE_URL points outside the data directory".to_string());
        }
    }
    if db_path.is_none() {
        warnings.push("database location is not configured".to_string());
    }
    if env.runtime_mode.is_desktop() && env.node_env != NodeEnv::Production {
        warnings.push(format!(
            "desktop build running with NODE_ENV={}",
            env.node_env.as_str()
        ));
    }

    EnvSafety {
        node_env: env.node_env,
        skip_env_validation: env.skip_env_validation,
        database_url_set: database_url.is_some(),
        database_inside_data_dir,
        warnings,
    }
}
