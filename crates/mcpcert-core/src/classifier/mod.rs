//! Security-relevant file selection.
//!
//! Tags files from a fetched repository tree with a semantic role so the
//! analysis engine only sees material worth reading. Files matching no
//! heuristic are dropped rather than guessed at.

use std::collections::BTreeMap;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, trace};

use crate::profile::FileType;

/// Byte budget per file type bucket submitted to the analysis engine.
pub const BUCKET_BUDGET_BYTES: usize = 48 * 1024;
/// A single file never contributes more than this many bytes.
pub const MAX_FILE_BYTES: usize = 16 * 1024;

const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// One file from a repository checkout, path relative to the checkout root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

/// Immutable snapshot of a repository's files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    pub files: Vec<FileEntry>,
}

impl FileTree {
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self { files }
    }
}

/// A file selected for analysis, tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub path: String,
    pub file_type: FileType,
    pub content: String,
    pub truncated: bool,
}

/// File names matched exactly (lowercased) per bucket.
const CONFIG_NAMES: &[&str] = &[
    "config.py",
    "settings.py",
    "config.json",
    "config.toml",
    "config.yaml",
    "config.yml",
    ".env.example",
    ".env.sample",
    "docker-compose.yml",
    "docker-compose.yaml",
    "dockerfile",
];

const DOCS_NAMES: &[&str] = &["readme.md", "security.md", "api.md", "contributing.md"];

const DEPENDENCY_NAMES: &[&str] = &[
    "requirements.txt",
    "package.json",
    "package-lock.json",
    "pyproject.toml",
    "setup.py",
    "pipfile",
    "poetry.lock",
    "uv.lock",
    "cargo.toml",
    "cargo.lock",
    "go.mod",
    "go.sum",
];

/// File stems (name without extension) matched per bucket.
const AUTH_STEMS: &[&str] = &[
    "auth",
    "authentication",
    "authorization",
    "security",
    "login",
    "oauth",
    "jwt",
    "token",
];

const API_STEMS: &[&str] = &[
    "api", "routes", "router", "endpoints", "views", "controllers", "handlers",
];

const MAIN_STEMS: &[&str] = &["app", "main", "server", "index", "__main__", "run"];

/// Content keywords consulted when a file name matches no table. Checked in
/// bucket order; first automaton with a hit wins.
static CONTENT_SIGNATURES: Lazy<Vec<(FileType, AhoCorasick)>> = Lazy::new(|| {
    let automaton = |keywords: &[&str]| {
        AhoCorasick::new(keywords).expect("static keyword set must compile")
    };
    vec![
        (
            FileType::Auth,
            automaton(&["authenticate", "login", "bearer", "oauth", "jwt", "api_key"]),
        ),
        (
            FileType::Api,
            automaton(&[
                "app.route",
                "fastapi",
                "endpoint",
                "add_route",
                "request handler",
                "router.",
            ]),
        ),
        (
            FileType::Config,
            automaton(&["config", "settings", "environment variable", "getenv"]),
        ),
    ]
});

static ENTRY_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)if __name__ == ['"]__main__['"]|^\s*fn main\s*\(|^\s*func main\s*\(|createServer\s*\(|\.listen\s*\("#,
    )
    .expect("entry point pattern must compile")
});

/// Classify a repository tree into analysis-ready files.
///
/// Deterministic and idempotent: the same tree always yields the same
/// `(path, file_type)` set, ordered by file type then path. The input tree is
/// not mutated. Per-bucket byte budgets prefer smaller files and truncate the
/// last admitted file rather than dropping whole buckets.
#[instrument(skip(tree), fields(files = tree.files.len()))]
pub fn classify(tree: &FileTree) -> Vec<ClassifiedFile> {
    let mut buckets: BTreeMap<FileType, Vec<&FileEntry>> = BTreeMap::new();

    for entry in &tree.files {
        if entry.content.contains('\0') {
            trace!(path = %entry.path, "skipping binary file");
            continue;
        }
        if entry.path.split('/').any(|part| part == ".git") {
            continue;
        }
        match classify_path(&entry.path).or_else(|| classify_content(&entry.path, &entry.content))
        {
            Some(file_type) => buckets.entry(file_type).or_default().push(entry),
            None => trace!(path = %entry.path, "no heuristic matched, dropping"),
        }
    }

    let mut selected = Vec::new();
    for file_type in FileType::ALL {
        let Some(mut candidates) = buckets.remove(&file_type) else {
            continue;
        };
        // Smaller, representative files first so the budget is not consumed
        // by one generated artifact.
        candidates.sort_by(|a, b| {
            a.content
                .len()
                .cmp(&b.content.len())
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut remaining = BUCKET_BUDGET_BYTES;
        for entry in candidates {
            if remaining == 0 {
                debug!(bucket = file_type.as_str(), path = %entry.path, "bucket budget exhausted");
                break;
            }
            let cap = remaining.min(MAX_FILE_BYTES);
            let (content, truncated) = clip(&entry.content, cap);
            remaining -= content.len().min(remaining);
            selected.push(ClassifiedFile {
                path: entry.path.clone(),
                file_type,
                content,
                truncated,
            });
        }
    }

    selected.sort_by(|a, b| a.file_type.cmp(&b.file_type).then_with(|| a.path.cmp(&b.path)));
    debug!(selected = selected.len(), "classification complete");
    selected
}

fn classify_path(path: &str) -> Option<FileType> {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();

    if CONFIG_NAMES.contains(&name.as_str()) {
        return Some(FileType::Config);
    }
    if DOCS_NAMES.contains(&name.as_str()) {
        return Some(FileType::Docs);
    }
    if DEPENDENCY_NAMES.contains(&name.as_str()) {
        return Some(FileType::Dependencies);
    }

    // Stem tables only apply to source files; README.md must not become
    // `main` and SECURITY.md must not become `auth`.
    if !is_source_file(&name) {
        return None;
    }
    let stem = name.split('.').next().unwrap_or(&name);
    if AUTH_STEMS.contains(&stem) {
        return Some(FileType::Auth);
    }
    if API_STEMS.contains(&stem) {
        return Some(FileType::Api);
    }
    if MAIN_STEMS.contains(&stem) {
        return Some(FileType::Main);
    }
    None
}

/// Fallback for source files whose names carry no signal.
fn classify_content(path: &str, content: &str) -> Option<FileType> {
    if !is_source_file(path) {
        return None;
    }
    let lowered = content.to_ascii_lowercase();
    for (file_type, automaton) in CONTENT_SIGNATURES.iter() {
        if automaton.is_match(&lowered) {
            return Some(*file_type);
        }
    }
    if ENTRY_POINT.is_match(content) {
        return Some(FileType::Main);
    }
    None
}

fn is_source_file(path: &str) -> bool {
    const SOURCE_EXTENSIONS: &[&str] = &["py", "rs", "js", "ts", "go", "rb", "java"];
    path.rsplit('.')
        .next()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Clip content to `cap` bytes at a char boundary, appending a marker when
/// anything was dropped.
fn clip(content: &str, cap: usize) -> (String, bool) {
    if content.len() <= cap {
        return (content.to_string(), false);
    }
    let mut cut = cap.saturating_sub(TRUNCATION_MARKER.len());
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut clipped = content[..cut].to_string();
    clipped.push_str(TRUNCATION_MARKER);
    (clipped, true)
}
