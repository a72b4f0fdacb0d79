//! Bulk loading of ingredients from a `name,measurement_unit` CSV file.

use std::path::Path;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, instrument};

use super::repo::{IngredientRepo, NewIngredient};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

fn fail(line: usize, reason: impl Into<String>) -> ParseError {
    ParseError {
        line,
        reason: reason.into(),
    }
}

/// Splits one record into fields. Fields may be wrapped in double quotes,
/// with `""` standing for a literal quote inside them.
fn split_record(raw: &str, line: usize) -> Result<Vec<String>, ParseError> {
    let mut fields = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err(fail(line, "unterminated quoted field")),
                }
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Ok(fields);
                }
                Some(',') => fields.push(field),
                Some(_) => return Err(fail(line, "unexpected character after quoted field")),
            }
        } else {
            loop {
                match chars.next() {
                    None => {
                        fields.push(field.trim().to_string());
                        return Ok(fields);
                    }
                    Some(',') => break,
                    Some(c) => field.push(c),
                }
            }
            fields.push(field.trim().to_string());
        }
    }
}

fn is_header(fields: &[String]) -> bool {
    fields.len() == 2
        && fields[0].eq_ignore_ascii_case("name")
        && fields[1].eq_ignore_ascii_case("measurement_unit")
}

pub fn parse(text: &str) -> Result<Vec<NewIngredient>, ParseError> {
    let mut rows = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            continue;
        }

        let fields = split_record(raw, line)?;
        if rows.is_empty() && is_header(&fields) {
            continue;
        }
        let [name, unit] = fields.as_slice() else {
            return Err(fail(
                line,
                format!("expected 2 fields, found {}", fields.len()),
            ));
        };
        if name.trim().is_empty() || unit.trim().is_empty() {
            return Err(fail(line, "name and measurement unit must not be empty"));
        }
        rows.push(NewIngredient {
            name: name.trim().to_string(),
            measurement_unit: unit.trim().to_string(),
        });
    }
    Ok(rows)
}

#[instrument(skip(repo))]
pub async fn load_from_path(repo: &dyn IngredientRepo, path: &Path) -> anyhow::Result<u64> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let rows = parse(&text).with_context(|| format!("parse {}", path.display()))?;
    let inserted = repo.insert_many(&rows).await?;
    info!(inserted, path = %path.display(), "ingredients loaded");
    Ok(inserted)
}
