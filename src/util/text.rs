/// Column width of the rendered text.
const TEXT_WIDTH: usize = 80;

/// Render article HTML as plain text for the `.txt` sidecar.
///
/// Lines are wrapped at 80 columns, trimmed, and blank lines dropped.
///
/// ```
/// use influss::util::html_to_text;
///
/// let text = html_to_text("<p>Fish &amp; chips</p>").unwrap();
/// assert_eq!(text, "Fish & chips");
/// ```
///
/// # Errors
///
/// Returns the converter's error if the document cannot be rendered.
pub fn html_to_text(html: &str) -> Result<String, html2text::Error> {
    let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH)?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paragraphs_become_lines() {
        let text = html_to_text("<article><p>First</p>\n\n<p>Second</p></article>").unwrap();
        assert_eq!(text, "First\nSecond");
    }

    #[test]
    fn test_markup_is_dropped() {
        let text =
            html_to_text("<p>A <a href=\"/x\">link</a> and <em>emphasis</em>.</p>").unwrap();
        assert!(text.contains("link"), "{text}");
        assert!(text.contains("emphasis"), "{text}");
        assert!(!text.contains('<'), "{text}");
    }

    #[test]
    fn test_script_and_style_content_removed() {
        let html = concat!(
            "<p>Before</p>",
            "<script>var secret = 1;</script>",
            "<style>p{color:red}</style>",
            "<p>After</p>"
        );
        let text = html_to_text(html).unwrap();
        assert!(text.contains("Before") && text.contains("After"), "{text}");
        assert!(!text.contains("secret"), "{text}");
        assert!(!text.contains("color"), "{text}");
    }

    #[test]
    fn test_entities_decoded() {
        let text = html_to_text("<p>caf&eacute; &mdash; &#x41; &lt;tag&gt;</p>").unwrap();
        assert_eq!(text, "café \u{2014} A <tag>");
    }

    #[test]
    fn test_long_lines_wrap() {
        let html = format!("<p>{}</p>", "word ".repeat(100));
        let text = html_to_text(&html).unwrap();
        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|line| line.chars().count() <= TEXT_WIDTH));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(html_to_text("").unwrap(), "");
    }
}
