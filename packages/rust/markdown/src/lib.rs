//! Block-tree to Markdown conversion and cleanup passes.
//!
//! Renders a fully fetched (and already media-rewritten) block tree into one
//! Markdown string, then applies cleanup passes so repeated runs over the same
//! content produce byte-identical output. Links are emitted exactly as found
//! in the blocks; mirrored `assets/...` paths are never re-resolved.

mod cleanup;
mod rich_text;

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use notionsync_shared::{Block, BlockKind, MediaBlock, RichText, TableBlock, plain_text};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting a block tree to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The final Markdown body, empty or ending in exactly one newline.
    pub markdown: String,
    /// Approximate word count of the body, excluding code blocks.
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert an ordered block tree to clean Markdown.
#[instrument(skip_all, fields(blocks = blocks.len()))]
pub fn convert(blocks: &[Block]) -> ConvertResult {
    let raw = render_blocks(blocks);
    let markdown = cleanup::run_pipeline(&raw);
    let word_count = count_words(&markdown);

    debug!(raw_len = raw.len(), final_len = markdown.len(), word_count, "conversion complete");

    ConvertResult {
        markdown,
        word_count,
    }
}

/// Render sibling blocks, keeping consecutive items of one list kind tight.
fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut prev_list: Option<&str> = None;
    let mut number = 0;

    for block in blocks {
        number = match block.kind {
            BlockKind::NumberedListItem(_) => number + 1,
            _ => 0,
        };

        let rendered = render_block(block, number);
        if rendered.is_empty() {
            continue;
        }

        let list = is_list_item(&block.kind).then(|| block.type_name());
        if !out.is_empty() {
            let tight = list.is_some() && list == prev_list;
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        prev_list = list;
    }

    out
}

fn is_list_item(kind: &BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::BulletedListItem(_) | BlockKind::NumberedListItem(_) | BlockKind::ToDo(_)
    )
}

/// Render one block and its nested content.
fn render_block(block: &Block, number: usize) -> String {
    let head = match &block.kind {
        BlockKind::Paragraph(t) => rich_text::render(&t.rich_text),
        BlockKind::Heading1(t) => heading(1, &t.rich_text),
        BlockKind::Heading2(t) => heading(2, &t.rich_text),
        BlockKind::Heading3(t) => heading(3, &t.rich_text),
        BlockKind::BulletedListItem(t) => format!("- {}", rich_text::render(&t.rich_text)),
        BlockKind::NumberedListItem(t) => {
            format!("{number}. {}", rich_text::render(&t.rich_text))
        }
        BlockKind::ToDo(t) => {
            let mark = if t.checked { "x" } else { " " };
            format!("- [{mark}] {}", rich_text::render(&t.rich_text))
        }
        BlockKind::Quote(t) => quote(&rich_text::render(&t.rich_text)),
        BlockKind::Callout(c) => {
            let text = rich_text::render(&c.rich_text);
            match c.icon.as_ref().map(|i| i.emoji()).filter(|e| !e.is_empty()) {
                Some(emoji) => quote(&format!("{emoji} {text}")),
                None => quote(&text),
            }
        }
        BlockKind::Code(c) => format!(
            "```{}\n{}\n```",
            code_language(&c.language),
            plain_text(&c.rich_text)
        ),
        BlockKind::Divider => "---".to_string(),
        BlockKind::Equation(e) => format!("$$\n{}\n$$", e.expression),
        BlockKind::Image(m) => {
            if m.source.url().is_empty() {
                String::new()
            } else {
                format!("![{}]({})", plain_text(&m.caption), m.source.url())
            }
        }
        BlockKind::Video(m) => media_link(m, "video"),
        BlockKind::File(m) => media_link(m, "file"),
        BlockKind::Pdf(m) => media_link(m, "pdf"),
        BlockKind::Embed(l) => link(&l.url, "embed"),
        BlockKind::Bookmark(l) => {
            let caption = plain_text(&l.caption);
            let label = if caption.is_empty() { l.url.as_str() } else { caption.as_str() };
            link(&l.url, label)
        }
        BlockKind::LinkPreview(l) => link(&l.url, &l.url),

        // Containers place their children themselves.
        BlockKind::Toggle(t) => return toggle(&rich_text::render(&t.rich_text), &block.children),
        BlockKind::ChildPage(c) => {
            return join_sections(&format!("# {}", c.title), &render_blocks(&block.children));
        }
        BlockKind::Table(t) => return table(t, &block.children),
        BlockKind::TableRow(r) => return table_row(&r.cells, r.cells.len()),
        BlockKind::Other { block_type, .. } => {
            debug!(block_type, block_id = %block.id, "rendering children of unsupported block");
            return render_blocks(&block.children);
        }
    };

    let children = render_blocks(&block.children);
    if children.is_empty() {
        head
    } else if is_list_item(&block.kind) {
        format!("{head}\n{}", indent(&children))
    } else {
        join_sections(&head, &children)
    }
}

// ---------------------------------------------------------------------------
// Block helpers
// ---------------------------------------------------------------------------

fn heading(level: usize, runs: &[RichText]) -> String {
    format!("{} {}", "#".repeat(level), rich_text::render(runs))
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn link(url: &str, label: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    format!("[{label}]({url})")
}

/// `[label](url)` for non-image media, preferring the file name then the caption.
fn media_link(media: &MediaBlock, fallback: &str) -> String {
    let caption = plain_text(&media.caption);
    let label = media
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or_else(|| (!caption.is_empty()).then_some(caption.as_str()))
        .unwrap_or(fallback);
    link(media.source.url(), label)
}

fn toggle(summary: &str, children: &[Block]) -> String {
    let body = render_blocks(children);
    if body.is_empty() {
        format!("<details>\n<summary>{summary}</summary>\n</details>")
    } else {
        format!("<details>\n<summary>{summary}</summary>\n\n{body}\n\n</details>")
    }
}

fn table(table: &TableBlock, rows: &[Block]) -> String {
    let rows: Vec<_> = rows
        .iter()
        .filter_map(|b| match &b.kind {
            BlockKind::TableRow(r) => Some(&r.cells),
            _ => None,
        })
        .collect();
    let width = rows
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(table.table_width);
    if rows.is_empty() || width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, cells) in rows.iter().enumerate() {
        lines.push(table_row(cells, width));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn table_row(cells: &[Vec<RichText>], width: usize) -> String {
    let mut line = String::from("|");
    for i in 0..width {
        let text = cells
            .get(i)
            .map(|runs| rich_text::render(runs))
            .unwrap_or_default()
            .replace('|', "\\|")
            .replace('\n', " ");
        line.push_str(&format!(" {} |", text.trim()));
    }
    line
}

/// Notion language names to fence info strings (`plain text` -> `text`).
fn code_language(language: &str) -> String {
    match language.trim().to_lowercase().as_str() {
        "plain text" => "text".to_string(),
        "c++" => "cpp".to_string(),
        "c#" => "csharp".to_string(),
        "f#" => "fsharp".to_string(),
        other => other.replace(' ', ""),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("    {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_sections(head: &str, body: &str) -> String {
    match (head.is_empty(), body.is_empty()) {
        (true, _) => body.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head}\n\n{body}"),
    }
}

/// Count words in a Markdown body, excluding code blocks.
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
