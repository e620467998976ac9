//! Minimal single-stream PDF writer. The rendering contract (§1, §6) only
//! requires a valid PDF byte stream behind the download endpoint -- page
//! layout is explicitly out of scope, so this emits one page of monospaced
//! text per report rather than pulling in a layout engine.

use pulldown_cmark::{Event, Parser, Tag};

const FONT_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 13.0;
const LEFT_MARGIN: f32 = 40.0;
const TOP_MARGIN: f32 = 760.0;
const MAX_LINES_PER_PAGE: usize = 54;

fn markdown_to_lines(markdown: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) => current.push_str(&t),
            Event::Code(t) => current.push_str(&t),
            Event::SoftBreak | Event::HardBreak => {
                lines.push(std::mem::take(&mut current));
            }
            Event::End(Tag::Heading(..)) | Event::End(Tag::Paragraph) | Event::End(Tag::Item) => {
                lines.push(std::mem::take(&mut current));
                lines.push(String::new());
            }
            _ => {}
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn escape_pdf_text(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii() && !c.is_control())
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn content_stream(lines: &[String]) -> String {
    let mut stream = format!("BT /F1 {FONT_SIZE} Tf {LINE_HEIGHT} TL {LEFT_MARGIN} {TOP_MARGIN} Td\n");
    for line in lines.iter().take(MAX_LINES_PER_PAGE) {
        stream.push_str(&format!("({}) Tj T*\n", escape_pdf_text(line)));
    }
    stream.push_str("ET");
    stream
}

/// Renders a markdown report to a minimal one-page PDF document.
pub fn render(markdown: &str) -> Vec<u8> {
    let lines = markdown_to_lines(markdown);
    let content = content_stream(&lines);

    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push("<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string());
    objects.push(
        "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 5 0 R >> >> \
         /MediaBox [0 0 612 792] /Contents 4 0 R >>"
            .to_string(),
    );
    objects.push(format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string());

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_a_well_formed_pdf_byte_stream() {
        let bytes = render("# Inspection report\n\nStatus: completed\n");
        assert!(bytes.starts_with(b"%PDF-1.4\n"));
        let tail = String::from_utf8_lossy(&bytes[bytes.len().saturating_sub(64)..]);
        assert!(tail.contains("%%EOF"));
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("trailer"));
        assert!(body.contains("xref"));
    }

    #[test]
    fn escape_pdf_text_escapes_parens_and_backslashes() {
        assert_eq!(escape_pdf_text("a(b)c\\d"), "a\\(b\\)c\\\\d");
    }

    #[test]
    fn escape_pdf_text_drops_control_characters() {
        assert_eq!(escape_pdf_text("a\tb\nc"), "abc");
    }

    #[test]
    fn markdown_to_lines_splits_on_block_boundaries() {
        let lines = markdown_to_lines("# Title\n\nBody text.\n");
        assert!(lines.iter().any(|l| l == "Title"));
        assert!(lines.iter().any(|l| l == "Body text."));
    }

    #[test]
    fn empty_report_still_produces_a_valid_document() {
        let bytes = render("");
        assert!(bytes.starts_with(b"%PDF-1.4\n"));
    }
}
