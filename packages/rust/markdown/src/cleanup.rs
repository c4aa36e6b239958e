//! Post-render cleanup pipeline for Markdown output.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Passes never touch the inside of fenced code blocks.

/// Run the full cleanup pipeline on rendered Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

/// Whether a line opens or closes a fenced code block.
fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize whitespace
// ---------------------------------------------------------------------------

/// Strip trailing whitespace from every line outside code fences.
fn normalize_whitespace(md: &str) -> String {
    let mut in_code_block = false;

    md.lines()
        .map(|line| {
            if is_fence(line) {
                in_code_block = !in_code_block;
                return line.trim_end();
            }
            if in_code_block { line } else { line.trim_end() }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Clean up excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into one and drop leading blank lines.
fn clean_blank_lines(md: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_code_block = false;

    for line in md.lines() {
        if is_fence(line) {
            in_code_block = !in_code_block;
        } else if !in_code_block && line.is_empty() {
            match lines.last() {
                None => continue,
                Some(prev) if prev.is_empty() => continue,
                Some(_) => {}
            }
        }
        lines.push(line);
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Ensure trailing newline
// ---------------------------------------------------------------------------

/// End non-empty output with exactly one newline; empty output stays empty.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
