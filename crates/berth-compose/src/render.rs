//! Source-annotated diagnostic rendering.

use std::io;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::diagnostics::{Diagnostic, Diagnostics, Severity};

/// Render every diagnostic as an ariadne report against `source`.
///
/// Diagnostics without a position fall back to the plain one-line form.
///
/// # Errors
///
/// Propagates I/O failures from the writer.
pub fn write_reports<W: io::Write>(
    diagnostics: &Diagnostics,
    filename: &str,
    source: &str,
    writer: &mut W,
) -> io::Result<()> {
    for diagnostic in diagnostics {
        match diagnostic.pos {
            Some(_) => write_report(diagnostic, filename, source, &mut *writer)?,
            None => writeln!(
                writer,
                "{}: {}: {}",
                filename, diagnostic.severity, diagnostic.message
            )?,
        }
    }
    Ok(())
}

fn write_report<W: io::Write>(
    diagnostic: &Diagnostic,
    filename: &str,
    source: &str,
    writer: W,
) -> io::Result<()> {
    let pos = diagnostic.pos.expect("caller checked position");
    let at = pos.index.min(source.len());
    let range = at..(at + 1).min(source.len()).max(at);

    let (kind, color) = match diagnostic.severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Hint => (ReportKind::Advice, Color::Blue),
    };

    Report::build(kind, (filename, range.clone()))
        .with_message(&diagnostic.message)
        .with_label(
            Label::new((filename, range))
                .with_message(diagnostic.severity.as_str())
                .with_color(color),
        )
        .finish()
        .write((filename, Source::from(source)), writer)
}

/// Render a single diagnostic to a string, for tests and callers that want
/// the report without a sink.
pub fn render(diagnostic: &Diagnostic, filename: &str, source: &str) -> String {
    let mut output = Vec::new();
    match diagnostic.pos {
        Some(_) => {
            if write_report(diagnostic, filename, source, &mut output).is_err() {
                return format!("{}: {}", diagnostic.severity, diagnostic.message);
            }
        }
        None => {
            return format!(
                "{}: {}: {}",
                filename, diagnostic.severity, diagnostic.message
            );
        }
    }
    String::from_utf8(output)
        .unwrap_or_else(|_| format!("{}: {}", diagnostic.severity, diagnostic.message))
}
