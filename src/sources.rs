#![forbid(unsafe_code)]

//! URL sources that feed [`BatchSource::Urls`](crate::orchestrator::BatchSource).
//!
//! A list file is either a delimited table with a URL column (CSV, TSV or
//! `;`-separated exports) or plain text with one URL per line.

use crate::error::SourceError;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_URL_COLUMN: &str = "url";

const DELIMITERS: [char; 3] = [',', '\t', ';'];

pub fn read_url_list(path: &Path, column: &str) -> Result<Vec<String>, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let urls = parse_url_list(&content, column);
    if urls.is_empty() {
        return Err(SourceError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), count = urls.len(), "read URL list");
    Ok(urls)
}

/// Extracts URLs in file order. Blank cells, blank lines and `#` comments
/// are skipped.
pub fn parse_url_list(content: &str, column: &str) -> Vec<String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let column = column.trim();
    let mut lines = content.lines().map(str::trim).filter(|line| !line.is_empty());

    let Some(first) = lines.next() else {
        return Vec::new();
    };

    if let Some((delimiter, position)) = header_column(first, column) {
        return lines
            .filter_map(|line| split_cells(line, delimiter).into_iter().nth(position))
            .map(unquote)
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
            .collect();
    }

    std::iter::once(first)
        .chain(lines)
        .filter(|line| !line.starts_with('#'))
        .map(unquote)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds `column` (case-insensitive) in a header line. A single-cell header
/// such as a bare `url` line counts too.
fn header_column(line: &str, column: &str) -> Option<(char, usize)> {
    let delimiter = DELIMITERS
        .into_iter()
        .find(|delimiter| line.contains(*delimiter))
        .unwrap_or(',');
    split_cells(line, delimiter)
        .into_iter()
        .map(unquote)
        .position(|cell| cell.eq_ignore_ascii_case(column))
        .map(|position| (delimiter, position))
}

/// Splits on `delimiter` outside double quotes. An unbalanced quote runs to
/// the end of the line.
fn split_cells(line: &str, delimiter: char) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (offset, ch) in line.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == delimiter && !in_quotes {
            cells.push(&line[start..offset]);
            start = offset + ch.len_utf8();
        }
    }
    cells.push(&line[start..]);
    cells
}

fn unquote(cell: &str) -> &str {
    let cell = cell.trim();
    cell.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            cell.strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(cell)
        .trim()
}
