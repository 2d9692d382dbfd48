//! Positioned, severity-tagged diagnostics.

use std::fmt;
use std::io;

use berth_yaml::Pos;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The document cannot be used.
    Error,
    /// The document is usable but suspicious.
    Warning,
    /// Advisory only.
    Hint,
}

impl Severity {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single positioned diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source position, if one applies.
    pub pos: Option<Pos>,
}

/// Append-only list of diagnostics, in encounter order.
///
/// Appending is best-effort: if the list cannot grow, the message is released
/// and the drop counter increments instead of failing the enclosing
/// operation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    dropped: usize,
}

impl Diagnostics {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error.
    pub fn error(&mut self, pos: Option<Pos>, message: impl Into<String>) {
        self.push(Severity::Error, pos, message.into());
    }

    /// Append a warning.
    pub fn warning(&mut self, pos: Option<Pos>, message: impl Into<String>) {
        self.push(Severity::Warning, pos, message.into());
    }

    /// Append a hint.
    pub fn hint(&mut self, pos: Option<Pos>, message: impl Into<String>) {
        self.push(Severity::Hint, pos, message.into());
    }

    fn push(&mut self, severity: Severity, pos: Option<Pos>, message: String) {
        if self.items.try_reserve(1).is_err() {
            drop(message);
            self.dropped += 1;
            return;
        }
        self.items.push(Diagnostic {
            severity,
            message,
            pos,
        });
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Number of retained diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of diagnostics dropped because the list could not grow.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Iterate diagnostics in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    /// Write every diagnostic as `filename[:line[:col]]: severity: message`.
    ///
    /// Positions are one-indexed.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_all<W: io::Write>(&self, filename: &str, sink: &mut W) -> io::Result<()> {
        for d in &self.items {
            match d.pos {
                Some(pos) => writeln!(
                    sink,
                    "{}:{}:{}: {}: {}",
                    filename,
                    pos.display_line(),
                    pos.display_col(),
                    d.severity,
                    d.message
                )?,
                None => writeln!(sink, "{}: {}: {}", filename, d.severity, d.message)?,
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Hint.to_string(), "hint");
    }

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.warning(None, "looks off");
        assert!(!diags.has_errors());
        diags.error(None, "broken");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.dropped(), 0);
    }

    #[test]
    fn test_write_all_format() {
        let mut diags = Diagnostics::new();
        diags.error(Some(Pos::new(2, 4, 20)), "invalid port \"abc\"");
        diags.warning(None, "unknown key: banana");
        let mut out = Vec::new();
        diags.write_all("compose.yaml", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "compose.yaml:3:5: error: invalid port \"abc\"\n\
             compose.yaml: warning: unknown key: banana\n"
        );
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut diags = Diagnostics::new();
        diags.warning(Some(Pos::new(0, 0, 0)), "first");
        diags.error(Some(Pos::new(1, 0, 10)), "second");
        diags.hint(Some(Pos::new(2, 0, 20)), "third");
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }
}
