//! Changelog rendering.
//!
//! Output depends only on the release set and the query: releases are
//! sorted newest version first (raw string breaks ties), changes are
//! grouped in [`ChangeKind`] order and keep their recorded order within a
//! group. Rendering the same input twice yields identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{BerthError, Change, ChangeKind, Release, Result};
use crate::version::VersionComparator;

/// Rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogFormat {
    #[default]
    Markdown,
    Json,
    Text,
}

impl ChangelogFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ChangelogFormat::Markdown => "text/markdown; charset=utf-8",
            ChangelogFormat::Json => "application/json",
            ChangelogFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ChangelogFormat {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ChangelogFormat::Markdown),
            "json" => Ok(ChangelogFormat::Json),
            "text" | "txt" => Ok(ChangelogFormat::Text),
            other => Err(BerthError::Validation {
                issues: vec![format!(
                    "unknown changelog format '{other}' (expected markdown, json or text)"
                )],
            }),
        }
    }
}

/// Which releases to include and how to render them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogQuery {
    #[serde(default)]
    pub format: ChangelogFormat,
    /// Inclusive lower bound on release timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on release timestamp.
    pub to: Option<DateTime<Utc>>,
}

impl ChangelogQuery {
    fn includes(&self, release: &Release) -> bool {
        self.from.map_or(true, |from| release.timestamp >= from)
            && self.to.map_or(true, |to| release.timestamp <= to)
    }
}

/// A rendered changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogDocument {
    pub format: ChangelogFormat,
    pub body: String,
}

impl ChangelogDocument {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Hex SHA-256 of the body.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.body.as_bytes()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonEntry<'a> {
    version: &'a str,
    timestamp: DateTime<Utc>,
    author: &'a str,
    changes: BTreeMap<ChangeKind, Vec<&'a Change>>,
}

fn grouped(release: &Release) -> BTreeMap<ChangeKind, Vec<&Change>> {
    let mut groups: BTreeMap<ChangeKind, Vec<&Change>> = BTreeMap::new();
    for change in &release.changes {
        groups.entry(change.kind).or_default().push(change);
    }
    groups
}

fn change_line(change: &Change) -> String {
    let mut line = if change.category.is_empty() {
        change.description.clone()
    } else {
        format!("{}: {}", change.category, change.description)
    };
    let refs: Vec<String> = change
        .issue
        .iter()
        .map(|i| format!("issue {i}"))
        .chain(change.pull_request.iter().map(|p| format!("PR {p}")))
        .collect();
    if !refs.is_empty() {
        let _ = write!(line, " ({})", refs.join(", "));
    }
    line
}

fn render_markdown(releases: &[&Release]) -> String {
    let mut out = String::from("# Changelog\n");
    for release in releases {
        let _ = write!(
            out,
            "\n## {} ({})\n\n_Released by {}_\n",
            release.version,
            release.timestamp.format("%Y-%m-%d"),
            release.author
        );
        for (kind, changes) in grouped(release) {
            let _ = write!(out, "\n### {}\n\n", kind.heading());
            for change in changes {
                let _ = writeln!(out, "- {}", change_line(change));
            }
        }
    }
    out
}

fn render_text(releases: &[&Release]) -> String {
    let mut out = String::new();
    for (i, release) in releases.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} - {} ({})",
            release.version,
            release.timestamp.format("%Y-%m-%d"),
            release.author
        );
        for (kind, changes) in grouped(release) {
            let _ = writeln!(out, "  {}:", kind.heading());
            for change in changes {
                let _ = writeln!(out, "    * {}", change_line(change));
            }
        }
    }
    out
}

fn render_json(releases: &[&Release]) -> Result<String> {
    let entries: Vec<JsonEntry<'_>> = releases
        .iter()
        .map(|r| JsonEntry {
            version: &r.version,
            timestamp: r.timestamp,
            author: &r.author,
            changes: grouped(r),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Render a changelog over `releases`.
pub fn generate(
    releases: &[Release],
    query: &ChangelogQuery,
    comparator: &VersionComparator,
) -> Result<ChangelogDocument> {
    let mut selected: Vec<&Release> = releases.iter().filter(|r| query.includes(r)).collect();
    selected.sort_by(|a, b| comparator.compare_strict(&b.version, &a.version));

    let body = match query.format {
        ChangelogFormat::Markdown => render_markdown(&selected),
        ChangelogFormat::Json => render_json(&selected)?,
        ChangelogFormat::Text => render_text(&selected),
    };
    Ok(ChangelogDocument {
        format: query.format,
        body,
    })
}
