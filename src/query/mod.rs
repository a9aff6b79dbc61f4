// src/query/mod.rs

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Build the location of one monthly file:
/// `{prefix}{file_name}_{year}-{month:02}.parquet`.
pub fn source_url(prefix: &str, file_name: &str, year: i32, month: u32) -> String {
    format!("{prefix}{file_name}_{year}-{month:02}.parquet")
}

/// `SELECT *` over the file, with the URL quoted as a DuckDB string literal.
pub fn default_query(url: &str) -> String {
    format!("SELECT * FROM '{}'", url.replace('\'', "''"))
}

/// Produce the query for `url`.
///
/// If `template_path` points to a file, it is rendered with [`render_template`];
/// otherwise the [`default_query`] is used.
pub fn build_query(template_path: &Path, url: &str) -> Result<String> {
    if !template_path.is_file() {
        debug!(path = %template_path.display(), "no query template, selecting all columns");
        return Ok(default_query(url));
    }

    let template = fs::read_to_string(template_path)
        .with_context(|| format!("reading query template {}", template_path.display()))?;
    let query = render_template(&template, url)
        .with_context(|| format!("rendering query template {}", template_path.display()))?;
    info!(path = %template_path.display(), "using query template");
    Ok(query)
}

/// Substitute `url` into the single slot of `template`.
///
/// `{}` and `{0}` mark the slot, `{{` and `}}` are literal braces. Templates
/// with no slot, several slots, named placeholders or stray braces are rejected.
pub fn render_template(template: &str, url: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() + url.len());
    let mut slots = 0usize;
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => {
                            bail!("unbalanced '{{' at byte {pos} of query template")
                        }
                        Some((_, other)) => field.push(other),
                    }
                }
                if !field.is_empty() && field != "0" {
                    bail!("unsupported placeholder `{{{field}}}` at byte {pos} of query template");
                }
                slots += 1;
                out.push_str(url);
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_none() {
                    bail!("unmatched '}}' at byte {pos} of query template");
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }

    match slots {
        1 => Ok(out),
        0 => bail!("query template has no `{{}}` slot for the source URL"),
        n => bail!("query template has {n} slots for the source URL, expected exactly one"),
    }
}
