//! Inline rendering of styled text runs.

use url::Url;

use notionsync_shared::RichText;

/// Origin that workspace-relative links (`/abc123`) point into.
const WORKSPACE_ORIGIN: &str = "https://www.notion.so/";

/// Render a sequence of runs as inline Markdown.
pub(crate) fn render(runs: &[RichText]) -> String {
    runs.iter().map(render_run).collect()
}

/// Render one run, keeping surrounding whitespace outside the emphasis markers.
fn render_run(run: &RichText) -> String {
    let raw = if run.kind == "equation" {
        format!("${}$", run.content())
    } else {
        run.content().to_string()
    };

    let core = raw.trim();
    if core.is_empty() {
        return raw;
    }
    let lead = &raw[..raw.len() - raw.trim_start().len()];
    let trail = &raw[raw.trim_end().len()..];

    let annotations = &run.annotations;
    let mut styled = core.to_string();
    if annotations.code && run.kind != "equation" {
        styled = format!("`{styled}`");
    }
    if annotations.bold {
        styled = format!("**{styled}**");
    }
    if annotations.italic {
        styled = format!("_{styled}_");
    }
    if annotations.strikethrough {
        styled = format!("~~{styled}~~");
    }
    if let Some(href) = run.href.as_deref().filter(|h| !h.is_empty()) {
        styled = format!("[{styled}]({})", resolve_href(href));
    }

    format!("{lead}{styled}{trail}")
}

/// Make workspace-relative links absolute; leave everything else alone.
fn resolve_href(href: &str) -> String {
    if !href.starts_with('/') {
        return href.to_string();
    }
    match Url::parse(WORKSPACE_ORIGIN).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notionsync_shared::Annotations;

    fn styled(text: &str, annotations: Annotations) -> RichText {
        RichText {
            annotations,
            ..RichText::plain(text)
        }
    }

    #[test]
    fn plain_runs_concatenate() {
        let runs = vec![RichText::plain("Hello, "), RichText::plain("world")];
        assert_eq!(render(&runs), "Hello, world");
    }

    #[test]
    fn annotations_wrap_trimmed_core() {
        let run = styled(
            " bold move ",
            Annotations {
                bold: true,
                ..Annotations::default()
            },
        );
        assert_eq!(render(&[run]), " **bold move** ");
    }

    #[test]
    fn stacked_annotations() {
        let run = styled(
            "x",
            Annotations {
                bold: true,
                italic: true,
                strikethrough: true,
                code: true,
                ..Annotations::default()
            },
        );
        assert_eq!(render(&[run]), "~~_**`x`**_~~");
    }

    #[test]
    fn links_and_workspace_links() {
        let mut external = RichText::plain("docs");
        external.href = Some("https://example.com/docs".into());
        let mut internal = RichText::plain("other page");
        internal.href = Some("/0b6a4c2e1f6d4d6a".into());

        assert_eq!(render(&[external]), "[docs](https://example.com/docs)");
        assert_eq!(
            render(&[internal]),
            "[other page](https://www.notion.so/0b6a4c2e1f6d4d6a)"
        );
    }

    #[test]
    fn inline_equation() {
        let run = RichText {
            kind: "equation".into(),
            plain_text: "e^{i\\pi} + 1 = 0".into(),
            ..RichText::default()
        };
        assert_eq!(render(&[run]), "$e^{i\\pi} + 1 = 0$");
    }

    #[test]
    fn whitespace_only_run_is_untouched() {
        let run = styled(
            "  ",
            Annotations {
                bold: true,
                ..Annotations::default()
            },
        );
        assert_eq!(render(&[run]), "  ");
    }
}
