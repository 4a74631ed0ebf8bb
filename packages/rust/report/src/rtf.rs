//! Minimal rich-text rendering of a log window.
//!
//! The document is deliberately small: one monospace font, one red color
//! table entry, one paragraph per log line. A line is rendered in red
//! exactly when it starts with the phase-status prefix AND contains the
//! failure keyword phrase; neither condition alone is enough.

/// Prefix of the phase-status line the highlight rule keys on.
const HIGHLIGHT_PREFIX: &str = "Phase context status code:";

/// Document preamble: ANSI charset, monospace font, color table with red.
const PREAMBLE: &str = concat!(
    r"{\rtf1\ansi\deff0",
    r"{\fonttbl{\f0\fmodern Courier New;}}",
    r"{\colortbl ;\red255\green0\blue0;}",
    r"\f0\fs18",
    "\n",
);

/// Render `lines` into a complete RTF document.
pub fn render(lines: &[String], keyword: &str) -> String {
    let mut doc = String::with_capacity(PREAMBLE.len() + lines.len() * 40 + 2);
    doc.push_str(PREAMBLE);

    for line in lines {
        if is_highlighted(line, keyword) {
            doc.push_str(r"{\cf1 ");
            doc.push_str(&escape(line));
            doc.push_str(r"}\par");
        } else {
            doc.push_str(&escape(line));
            doc.push_str(r"\par");
        }
        doc.push('\n');
    }

    doc.push_str("}\n");
    doc
}

/// Both conditions, verbatim: the phase-status prefix and the keyword phrase.
fn is_highlighted(line: &str, keyword: &str) -> bool {
    line.starts_with(HIGHLIGHT_PREFIX) && !keyword.is_empty() && line.contains(keyword)
}

/// Escape one log line for embedding in an RTF paragraph.
///
/// Control words own `\`, `{`, `}`; everything else ASCII passes through.
/// Non-ASCII text is emitted as signed-16-bit `\uN?` escapes, one per
/// UTF-16 unit, so multi-byte input survives readers that only speak ANSI.
fn escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut utf16 = [0u16; 2];

    for c in line.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '\t' => out.push_str(r"\tab "),
            c if c.is_ascii() => out.push(c),
            c => {
                for unit in c.encode_utf16(&mut utf16) {
                    out.push_str(&format!(r"\u{}?", *unit as i16));
                }
            }
        }
    }

    out
}
