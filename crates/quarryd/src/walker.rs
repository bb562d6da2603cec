use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use quarry_config::{AnalysisConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FILE_BYTES};
use quarry_core::{Language, SourceFile, line_count, normalize_path};
use walkdir::{DirEntry, WalkDir};

/// Exact directory or file names that are never walked.
const IGNORED_NAMES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".quarry",
    "node_modules",
    "bower_components",
    "vendor",
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    ".next",
    ".nuxt",
    ".cache",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".DS_Store",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Gemfile.lock",
    "composer.lock",
];

const IGNORED_GLOBS: &[&str] = &["*.lock", "*.min.js", "*.min.css", "*.map", "*.log"];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "pdf", "zip", "tar", "gz",
    "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "o", "a",
    "lib", "bin", "dat", "db", "sqlite", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3",
    "mp4", "wav", "ogg", "avi", "mov", "mkv", "pyc", "pyo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub max_depth: usize,
    pub max_file_bytes: u64,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl From<&AnalysisConfig> for WalkOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_file_bytes: config.max_file_bytes,
        }
    }
}

struct DenyList {
    globs: GlobSet,
}

impl DenyList {
    fn new() -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in IGNORED_GLOBS {
            builder.add(Glob::new(pattern).with_context(|| format!("invalid glob {pattern}"))?);
        }
        Ok(Self {
            globs: builder.build().context("failed to build ignore globs")?,
        })
    }

    fn is_denied(&self, name: &str) -> bool {
        IGNORED_NAMES.contains(&name) || self.globs.is_match(name)
    }
}

/// Collects every readable text file under `root`. Unreadable entries and
/// unlistable directories are skipped; only an unreadable root is an error.
pub fn walk_tree(root: &Path, options: &WalkOptions) -> Result<Vec<SourceFile>> {
    fs::read_dir(root)
        .with_context(|| format!("failed to read working tree {}", root.display()))?;
    let deny = DenyList::new()?;

    let walker = WalkDir::new(root)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !deny.is_denied(&entry_name(entry)));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = read_source_file(root, &entry, options) {
            files.push(file);
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), "walked working tree");
    Ok(files)
}

fn read_source_file(root: &Path, entry: &DirEntry, options: &WalkOptions) -> Option<SourceFile> {
    let full_path = entry.path();
    let filename = entry_name(entry);
    let extension = full_path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if BINARY_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }

    let size = match entry.metadata() {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            tracing::warn!(
                path = %full_path.display(),
                error = %err,
                "skipping file without metadata"
            );
            return None;
        }
    };
    if size > options.max_file_bytes {
        return None;
    }

    let bytes = match fs::read(full_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %full_path.display(), error = %err, "skipping unreadable file");
            return None;
        }
    };
    let content = String::from_utf8(bytes).ok()?;

    let relative = full_path.strip_prefix(root).unwrap_or(full_path);
    Some(SourceFile {
        path: normalize_path(&relative.to_string_lossy()),
        filename,
        language: Language::from_extension(&extension),
        extension,
        line_count: line_count(&content),
        size,
        content,
    })
}

fn entry_name(entry: &DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}
