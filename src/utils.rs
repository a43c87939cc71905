//! Shared filesystem and naming helpers used by every pipeline stage.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::QuestionType;

/// Replaces characters that are illegal in file names with underscores.
///
/// Model identifiers such as `gemma3:27b` become `gemma3_27b`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '<' | '>' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// File name of one generator model's output for a document and question type.
///
/// `<document>_<model>_<qtype-slug>_<fewshot>.json`, with the model identifier
/// sanitised. The question-type slug is always the second-to-last `_` part.
pub fn generated_file_name(
    document: &str,
    model: &str,
    question_type: QuestionType,
    fewshot: usize,
) -> String {
    format!(
        "{}_{}_{}_{}.json",
        document,
        sanitize_filename(model),
        question_type.slug(),
        fewshot
    )
}

/// Fails unless `path` is an existing directory.
///
/// A missing input folder is the only condition that aborts a whole run.
///
/// # Errors
///
/// Returns an error naming the folder if it does not exist.
pub fn ensure_input_folder(path: &Path) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("Input folder does not exist: {}", path.display());
    }
    Ok(())
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed as `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes `value` as pretty JSON, replacing any existing file in one step.
///
/// The document is written to a temporary file in the destination directory
/// and then renamed over the target, so readers never observe a partial file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// written or renamed.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Lists the subdirectories of `dir`, sorted by name.
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
pub fn list_subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Lists the regular files in `dir` with the given extension, sorted by name.
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    Ok(files)
}

/// Returns the final path component without its extension, as UTF-8.
pub fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Returns the final path component as UTF-8.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|s| s.to_str())
}
