//! Slugs, front-matter documents and sync markers.

use chrono::NaiveDate;
use deunicode::deunicode;

use notionsync_shared::{Page, Result, SyncError};

/// Derive the content directory name from a page title.
///
/// Transliterates the title to ASCII, lower-cases it and joins its
/// alphanumeric runs with `-`. A title without any alphanumeric character
/// has no usable slug.
pub fn slugify(title: &str) -> Result<String> {
    let slug = deunicode(title)
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        return Err(SyncError::validation(format!(
            "title '{title}' does not produce a usable slug"
        )));
    }
    Ok(slug)
}

// ---------------------------------------------------------------------------
// Front matter
// ---------------------------------------------------------------------------

/// Metadata block written at the top of every generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    pub category: String,
    pub date: NaiveDate,
    pub title: String,
    pub tags: Vec<String>,
    pub icon: String,
    pub draft: bool,
}

impl FrontMatter {
    pub fn new(page: &Page, category: &str) -> Self {
        Self {
            category: category.to_string(),
            date: page.created_at,
            title: page.title.clone(),
            tags: page.tags.clone(),
            icon: page.icon.clone(),
            draft: false,
        }
    }

    /// Render the `+++`-delimited block, including both delimiters.
    pub fn render(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(",");

        let mut fm = String::from("+++\n");
        fm.push_str(&format!("categories = ['{}']\n", self.category));
        fm.push_str(&format!("date = '{}'\n", self.date.format("%Y-%m-%d")));
        fm.push_str(&format!("title = \"{}\"\n", escape_basic_string(&self.title)));
        fm.push_str(&format!("tags = [{tags}]\n"));
        fm.push_str(&format!("icon = '{}'\n", self.icon));
        fm.push_str(&format!("draft = {}\n", self.draft));
        fm.push_str("+++\n");
        fm
    }
}

/// Escape a value for a TOML basic (double-quoted) string.
fn escape_basic_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Compose the full document: front matter, then the body and a final newline.
pub fn render_document(front_matter: &FrontMatter, body: &str) -> String {
    format!(
        "{}{}\n",
        front_matter.render(),
        body.trim_end_matches('\n')
    )
}

// ---------------------------------------------------------------------------
// Sync marker
// ---------------------------------------------------------------------------

/// Provenance record stored beside each generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMarker {
    pub page_id: String,
    pub title: String,
}

impl SyncMarker {
    pub fn new(page: &Page) -> Self {
        Self {
            page_id: page.id.clone(),
            title: page.title.clone(),
        }
    }

    /// Two lines: the page id, then the title.
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.page_id, self.title)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let page_id = lines
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::validation("sync marker has no page id"))?;
        let title = lines.next().unwrap_or_default();

        Ok(Self {
            page_id: page_id.to_string(),
            title: title.to_string(),
        })
    }
}
