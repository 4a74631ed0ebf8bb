//! Log window persistence: render the selected lines and write them to the
//! output file, truncating whatever a previous run left behind.
//!
//! A write failure here is a hard stop for the pipeline; attaching a file
//! that was never written would only fail again at the mail stage.

pub mod rtf;

use std::path::Path;

use tracing::{info, instrument};

use buildwatch_shared::{BuildwatchError, ReportFormat, Result};

/// Render `lines` as plain text, each line newline-terminated.
pub fn render_plain(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Render and write the log window to `path`, replacing any existing file.
///
/// `keyword` feeds the RTF highlight rule; the plain format ignores it.
#[instrument(skip(lines, keyword), fields(lines = lines.len()))]
pub fn persist(lines: &[String], path: &Path, format: ReportFormat, keyword: &str) -> Result<()> {
    let content = match format {
        ReportFormat::Plain => render_plain(lines),
        ReportFormat::Rtf => rtf::render(lines, keyword),
    };

    std::fs::write(path, &content).map_err(|e| BuildwatchError::report(path, e))?;

    info!(path = %path.display(), bytes = content.len(), "log window persisted");
    Ok(())
}
