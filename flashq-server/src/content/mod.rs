//! Course corpus on disk
//!
//! Layout:
//!
//! ```text
//! <content_dir>/
//!   ml101/
//!     0_index.yaml         name: Machine Learning 101
//!     5_decision_trees.md
//!     12.md
//! ```
//!
//! Every card file starts with a YAML front-matter block between `---`
//! lines carrying `name` (the question), `module` and optional `tags`. The
//! Markdown body below it is rendered to HTML and becomes the card answer.
//! The leading digits of the file name are the card uid.

pub mod ingest;

pub use ingest::{ingest, IngestReport};

use flashq_common::models::CardDefinition;
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Front-matter fence
const FENCE: &str = "---";

/// Course index file inside each course folder
const COURSE_INDEX: &str = "0_index.yaml";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content directory not found: {0}")]
    MissingDir(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid course index {path}: {message}")]
    CourseIndex { path: PathBuf, message: String },

    #[error("Card file name must start with a numeric uid: {0}")]
    FileName(PathBuf),

    #[error("Invalid front matter in {path}: {message}")]
    FrontMatter { path: PathBuf, message: String },

    #[error("Card uid {uid} defined twice: {first} and {second}")]
    DuplicateUid {
        uid: i64,
        first: PathBuf,
        second: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct CourseIndex {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: String,
    module: String,
    // `tags:` with no value is null
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Read every card definition under `dir`
///
/// Courses are visited in slug order and cards inside a course in uid order.
/// Any malformed file aborts the whole load.
pub fn load_corpus(dir: &Path) -> Result<Vec<CardDefinition>, ContentError> {
    if !dir.is_dir() {
        return Err(ContentError::MissingDir(dir.to_path_buf()));
    }

    let mut course_dirs = Vec::new();
    for entry in read_dir(dir)? {
        if entry.is_dir() {
            course_dirs.push(entry);
        }
    }
    course_dirs.sort();

    let mut definitions = Vec::new();
    let mut seen: HashMap<i64, PathBuf> = HashMap::new();

    for course_dir in course_dirs {
        let slug = match course_dir.file_name().and_then(|n| n.to_str()) {
            Some(slug) => slug.to_string(),
            None => continue,
        };
        let course_name = load_course_index(&course_dir)?;

        let mut files = Vec::new();
        for path in read_dir(&course_dir)? {
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                files.push((parse_uid(&path)?, path));
            }
        }
        files.sort();

        debug!(course = %slug, cards = files.len(), "Loading course");

        for (uid, path) in files {
            if let Some(first) = seen.insert(uid, path.clone()) {
                return Err(ContentError::DuplicateUid {
                    uid,
                    first,
                    second: path,
                });
            }
            definitions.push(parse_card(&path, uid, &slug, course_name.clone())?);
        }
    }

    info!(
        "Loaded {} card definitions from {}",
        definitions.len(),
        dir.display()
    );
    Ok(definitions)
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, ContentError> {
    let io_err = |source| ContentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

fn read_file(path: &Path) -> Result<String, ContentError> {
    std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Course display name from `0_index.yaml`, if present
fn load_course_index(course_dir: &Path) -> Result<Option<String>, ContentError> {
    let path = course_dir.join(COURSE_INDEX);
    if !path.exists() {
        return Ok(None);
    }
    let index: CourseIndex =
        serde_yaml::from_str(&read_file(&path)?).map_err(|e| ContentError::CourseIndex {
            path: path.clone(),
            message: e.to_string(),
        })?;
    Ok(index
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty()))
}

/// `12_linear_models.md` -> 12
fn parse_uid(path: &Path) -> Result<i64, ContentError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ContentError::FileName(path.to_path_buf()))?;
    let digits = stem.split('_').next().unwrap_or_default();
    digits
        .parse::<i64>()
        .map_err(|_| ContentError::FileName(path.to_path_buf()))
}

fn parse_card(
    path: &Path,
    uid: i64,
    course_slug: &str,
    course_name: Option<String>,
) -> Result<CardDefinition, ContentError> {
    let content = read_file(path)?;
    let front_matter_err = |message: String| ContentError::FrontMatter {
        path: path.to_path_buf(),
        message,
    };

    let (header, body) = split_front_matter(&content).map_err(|m| front_matter_err(m.to_string()))?;
    let front: FrontMatter =
        serde_yaml::from_str(header).map_err(|e| front_matter_err(e.to_string()))?;

    let question = front.name.trim();
    let module = front.module.trim();
    if question.is_empty() {
        return Err(front_matter_err("name is empty".to_string()));
    }
    if module.is_empty() {
        return Err(front_matter_err("module is empty".to_string()));
    }

    let tags = front.tags.unwrap_or_default();
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(front_matter_err("tags must not be empty".to_string()));
    }

    Ok(CardDefinition {
        uid,
        module_name: module.to_string(),
        course_slug: course_slug.to_string(),
        course_name,
        question: question.to_string(),
        answer_body: render_markdown(body),
        tags,
    })
}

/// Split a document into its front-matter block and body
fn split_front_matter(content: &str) -> Result<(&str, &str), &'static str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim() == FENCE => {}
        _ => return Err("front matter must start with ---"),
    }

    let header_start = content.find('\n').map(|i| i + 1).unwrap_or(content.len());
    let mut offset = header_start;
    for line in lines {
        if line.trim() == FENCE {
            let header = &content[header_start..offset];
            let body = &content[offset + line.len()..];
            return Ok((header, body));
        }
        offset += line.len();
    }

    Err("front matter must end with ---")
}

/// Markdown to HTML with tables, strikethrough and task lists
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut output = String::new();
    html::push_html(&mut output, parser);
    output
}
