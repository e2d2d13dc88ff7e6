//! Annotation table rendering
//!
//! Turns one annotation record into an HTML table whose rows follow the sort
//! list. Per-position values get one cell each and are colored:
//! - numbers in `[0, 1]` through a 10-step ramp (see [`color_index`])
//! - symbols of the ancestral-state alphabet `A G L P` through a fixed palette
//! - anything else keeps the default color
//!
//! The likelihood and file-list panels use the same table conventions.

use gloome_common::protocol::{AnnotationRecord, AnnotationValue, FileListPayload, LikelihoodPayload, Scalar};

use crate::error::RenderError;

/// Low to high
pub const COLOR_RAMP: [&str; 10] = [
    "crimson",
    "orangered",
    "darkorange",
    "gold",
    "yellowgreen",
    "forestgreen",
    "mediumturquoise",
    "dodgerblue",
    "slateblue",
    "darkviolet",
];

/// Ancestral-state symbols
pub const SYMBOL_PALETTE: [(&str, &str); 4] = [
    ("A", "crimson"),
    ("G", "darkorange"),
    ("L", "forestgreen"),
    ("P", "slateblue"),
];

pub const NODE_SUMMARY_TITLE: &str = "Node information";
pub const BRANCH_SUMMARY_TITLE: &str = "Branch information";
pub const LIKELIHOOD_SUMMARY_TITLE: &str = "Log-likelihood information";
pub const FILE_LIST_SUMMARY_TITLE: &str = "File list";

/// Summary tables are wrapped in a collapsible section; inline tables are bare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableMode {
    Summary { title: String },
    Inline,
}

impl TableMode {
    pub fn summary(title: impl Into<String>) -> Self {
        TableMode::Summary { title: title.into() }
    }
}

/// Ramp index for a value in `[0, 1]`: `min(floor(v * 10), 9)`
pub fn color_index(value: f64) -> usize {
    ((value * 10.0).trunc().max(0.0) as usize).min(COLOR_RAMP.len() - 1)
}

/// Color override for one per-position cell
pub fn cell_color(value: &Scalar) -> Option<&'static str> {
    if let Scalar::Text(symbol) = value {
        if let Some((_, color)) = SYMBOL_PALETTE.iter().find(|(s, _)| *s == symbol.trim()) {
            return Some(*color);
        }
    }
    let number = value.as_number()?;
    if (0.0..=1.0).contains(&number) {
        Some(COLOR_RAMP[color_index(number)])
    } else {
        None
    }
}

/// Render one record
///
/// Fails when an attribute named in `sort_list` is absent from `record`.
pub fn render_table(
    record: &AnnotationRecord,
    sort_list: &[String],
    mode: &TableMode,
    sequence_length: Option<usize>,
) -> Result<String, RenderError> {
    let mut rows = String::new();

    if let Some(len) = sequence_length.filter(|n| *n > 0) {
        rows.push_str("<tr><th>Position</th>");
        for position in 1..=len {
            rows.push_str(&format!("<td class=\"position\">{}</td>", position));
        }
        rows.push_str("</tr>");
    }

    for attribute in sort_list {
        let value = record
            .get(attribute)
            .ok_or_else(|| RenderError::MissingAttribute(attribute.clone()))?;
        rows.push_str(&format!("<tr><th>{}</th>", escape_html(attribute)));
        match value {
            AnnotationValue::Scalar(scalar) => {
                rows.push_str(&format!("<td>{}</td>", escape_html(&scalar.to_string())));
            }
            AnnotationValue::Sequence(cells) => {
                for cell in cells {
                    match cell_color(cell) {
                        Some(color) => rows.push_str(&format!(
                            "<td style=\"color: {}\">{}</td>",
                            color,
                            escape_html(&cell.to_string())
                        )),
                        None => rows.push_str(&format!("<td>{}</td>", escape_html(&cell.to_string()))),
                    }
                }
            }
        }
        rows.push_str("</tr>");
    }

    let table = format!("<table class=\"annotation-table\">{}</table>", rows);
    Ok(wrap(mode, table))
}

/// Likelihood panel: one row per reported value
pub fn render_likelihood(payload: &LikelihoodPayload) -> String {
    let rows: String = payload
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("<tr><th>{}</th><td>{}</td></tr>", i, escape_html(&v.to_string())))
        .collect();
    wrap(
        &TableMode::summary(LIKELIHOOD_SUMMARY_TITLE),
        format!("<table class=\"likelihood-table\">{}</table>", rows),
    )
}

/// File-list panel: labels, download links, display names
pub fn render_file_list(payload: &FileListPayload) -> String {
    let mut headers = String::new();
    let mut links = String::new();
    let mut names = String::new();
    for entry in &payload.entries {
        headers.push_str(&format!("<th>{}</th>", escape_html(&entry.label)));
        links.push_str(&format!(
            "<td><a href=\"{url}\" download>{url}</a></td>",
            url = escape_html(&entry.url)
        ));
        names.push_str(&format!("<td>{}</td>", escape_html(&entry.display_name)));
    }
    wrap(
        &TableMode::summary(FILE_LIST_SUMMARY_TITLE),
        format!(
            "<table class=\"file-list-table\"><tr>{}</tr><tr>{}</tr><tr>{}</tr></table>",
            headers, links, names
        ),
    )
}

fn wrap(mode: &TableMode, table: String) -> String {
    match mode {
        TableMode::Summary { title } => format!(
            "<details open><summary>{}</summary>{}</details>",
            escape_html(title),
            table
        ),
        TableMode::Inline => table,
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
