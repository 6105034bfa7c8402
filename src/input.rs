// src/input.rs
// =============================================================================
// Turns files, arguments and piped stdin into one list of identifiers.
//
// - One identifier per line, surrounding whitespace trimmed, blank lines
//   skipped
// - Sources are merged in order: --file, positional arguments, stdin
// - Repeated identifiers are dropped, first occurrence wins
// =============================================================================

use std::collections::HashSet;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read stdin: {0}")]
    Stdin(#[source] io::Error),
}

pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_file(path: &Path) -> Result<Vec<String>, InputError> {
    std::fs::read_to_string(path)
        .map(|text| parse_lines(&text))
        .map_err(|source| InputError::File {
            path: path.to_path_buf(),
            source,
        })
}

pub fn read_lines<R: BufRead>(reader: R) -> Result<Vec<String>, InputError> {
    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(InputError::Stdin)?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            names.push(trimmed.to_string());
        }
    }
    Ok(names)
}

// Concatenates the sources and removes repeats while keeping order
pub fn merge<I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .flatten()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
