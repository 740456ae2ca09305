//! Local env file codec.
//!
//! Line-oriented `KEY=value` pairs. Blank lines and `#` comments are
//! ignored, as is a leading `export `. Double-quoted values may span
//! several physical lines and understand `\"` and `\\`; single-quoted values
//! are literal. On write, values containing whitespace, quotes, `#` or a
//! newline are double-quoted.

use crate::error::{SyncError, SyncResult};
use crate::files;
use std::path::Path;
use tracing::debug;
use vaultsync_types::VariableSet;

/// Parses env file content. `path` is only used for error messages.
pub fn parse(content: &str, path: &Path) -> SyncResult<VariableSet> {
    let mut set = VariableSet::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, raw)) = lines.next() {
        let line_no = index + 1;
        let parse_err = |message: String| SyncError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };

        let line = raw.trim_start();
        if line.trim_end().is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, rest) = line
            .split_once('=')
            .ok_or_else(|| parse_err("expected KEY=value".to_string()))?;
        let key = key.trim();
        let rest = rest.trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut buffer = quoted.to_string();
            loop {
                if let Some(value) = unescape_until_quote(&buffer) {
                    break value;
                }
                match lines.next() {
                    Some((_, next)) => {
                        buffer.push('\n');
                        buffer.push_str(next);
                    }
                    None => return Err(parse_err("unterminated double quote".to_string())),
                }
            }
        } else if let Some(quoted) = rest.strip_prefix('\'') {
            let end = quoted
                .find('\'')
                .ok_or_else(|| parse_err("unterminated single quote".to_string()))?;
            quoted[..end].to_string()
        } else {
            let unquoted = match rest.find(" #") {
                Some(comment) => &rest[..comment],
                None => rest,
            };
            unquoted.trim_end().to_string()
        };

        set.insert(key, value).map_err(|e| parse_err(e.to_string()))?;
    }

    Ok(set)
}

/// Returns the unescaped value if `text` contains a closing double quote.
fn unescape_until_quote(text: &str) -> Option<String> {
    let mut value = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next() {
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => value.push('\\'),
            },
            other => value.push(other),
        }
    }
    None
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#'))
}

/// Serializes a set in sorted key order.
pub fn serialize(set: &VariableSet) -> String {
    let mut out = String::new();
    for (key, value) in set.iter() {
        out.push_str(key);
        out.push('=');
        if needs_quotes(value) {
            out.push('"');
            for c in value.chars() {
                if matches!(c, '"' | '\\') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(value);
        }
        out.push('\n');
    }
    out
}

/// Reads and parses the env file at `path`. A missing file is an error.
pub async fn read(path: &Path) -> SyncResult<VariableSet> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    let set = parse(&content, path)?;
    debug!("Read {} variables from {}", set.len(), path.display());
    Ok(set)
}

/// Atomically replaces the env file with `set`, owner-only permissions.
pub async fn write(path: &Path, set: &VariableSet) -> SyncResult<()> {
    files::write_private_atomic(path, serialize(set).as_bytes()).await?;
    debug!("Wrote {} variables to {}", set.len(), path.display());
    Ok(())
}
