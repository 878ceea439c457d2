use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{CodegenError, CodegenResult};

const MARKER_PATTERN: &str =
    r"(?s)// <<<FORGE:BEGIN custom:([^>]+)>>>(.*?)// <<<FORGE:END custom:([^>]+)>>>";

pub struct CodeWriter;

impl CodeWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes `content` unless the file already holds exactly that.
    /// Returns whether the file was written.
    pub fn write_if_changed(&self, path: &Path, content: &str) -> CodegenResult<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if path.exists() && fs::read_to_string(path)? == content {
            debug!("{} is up to date", path.display());
            return Ok(false);
        }

        fs::write(path, content)?;
        Ok(true)
    }

    /// Like `write_if_changed`, but hand-written code between FORGE custom
    /// markers in the existing file is carried into the new content
    pub fn write_preserving_markers(&self, path: &Path, new_content: &str) -> CodegenResult<bool> {
        if !path.exists() {
            return self.write_if_changed(path, new_content);
        }

        let existing = fs::read_to_string(path)?;
        let merged = merge_with_markers(path, &existing, new_content)?;
        self.write_if_changed(path, &merged)
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn marker_regex() -> CodegenResult<Regex> {
    Regex::new(MARKER_PATTERN).map_err(|e| CodegenError::Marker {
        path: Default::default(),
        message: e.to_string(),
    })
}

fn merge_with_markers(path: &Path, existing: &str, new_content: &str) -> CodegenResult<String> {
    let regex = marker_regex()?;

    let mut blocks: HashMap<String, String> = HashMap::new();
    for captures in regex.captures_iter(existing) {
        let (Some(begin), Some(body), Some(end)) = (captures.get(1), captures.get(2), captures.get(3))
        else {
            continue;
        };
        if begin.as_str() != end.as_str() {
            return Err(CodegenError::Marker {
                path: path.to_path_buf(),
                message: format!(
                    "block '{}' is closed by '{}'",
                    begin.as_str(),
                    end.as_str()
                ),
            });
        }
        blocks.insert(begin.as_str().to_string(), body.as_str().to_string());
    }

    let mut result = new_content.to_string();
    for (id, body) in blocks {
        let begin_marker = format!("// <<<FORGE:BEGIN custom:{}>>>", id);
        let end_marker = format!("// <<<FORGE:END custom:{}>>>", id);

        if let (Some(start), Some(end_start)) = (result.find(&begin_marker), result.find(&end_marker)) {
            if end_start > start {
                let before = &result[..start + begin_marker.len()];
                let after = &result[end_start..];
                result = format!("{}{}{}", before, body, after);
            }
        }
    }

    Ok(result)
}
