//! Diagnostics: error/warning records, counters and the pluggable sink.
//!
//! Errors are fatal to the compilation unit as a whole (a unit with a
//! non-zero error count produces no output) but local to one construct:
//! factories emit and keep going so one mistake does not hide the next.
//! Warnings are counted separately and never fail the unit.

use std::{
    borrow::Cow,
    cell::RefCell,
    io::{self, Write as _},
    rc::Rc,
};

/// Message text for the fatal error-count overflow.
pub const TOO_MANY_ERRORS: &str = "Too many errors. Giving up!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One reported diagnostic.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u32,
    pub message: Cow<'static, str>,
}

impl Diagnostic {
    /// Renders the diagnostic the way it is written to the sink.
    pub fn render(&self, filename: &str) -> String {
        match self.severity {
            Severity::Error => format!("{filename}:{}: {}", self.line, self.message),
            Severity::Warning => format!("{filename}:{}: warning: {}", self.line, self.message),
        }
    }
}

/// Receives rendered diagnostics.
///
/// Implement this to capture or redirect compiler messages; the default
/// [`StderrSink`] writes to standard error.
pub trait DiagnosticSink {
    fn emit(&mut self, filename: &str, diagnostic: &Diagnostic);
}

/// Default sink, writing `filename:line: message` lines to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&mut self, filename: &str, diagnostic: &Diagnostic) {
        // A failed write to stderr leaves nowhere to report to; ignore it.
        let _ = writeln!(io::stderr(), "{}", diagnostic.render(filename));
    }
}

/// Sink that collects rendered lines, for tests and embedding callers.
///
/// The compilation context takes the sink by value; keep the shared handle
/// from [`CollectSink::new`] to read the lines afterwards.
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CollectSink {
    /// Creates a collecting sink and the handle used to read it back.
    pub fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let sink = Self::default();
        let handle = Rc::clone(&sink.lines);
        (sink, handle)
    }
}

impl DiagnosticSink for CollectSink {
    fn emit(&mut self, filename: &str, diagnostic: &Diagnostic) {
        self.lines.borrow_mut().push(diagnostic.render(filename));
    }
}

/// Counters and sink for one compilation unit.
pub struct Diagnostics {
    sink: Box<dyn DiagnosticSink>,
    errors: u32,
    warnings: u32,
    fatal: bool,
    history: Vec<Diagnostic>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new(sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            errors: 0,
            warnings: 0,
            fatal: false,
            history: Vec::new(),
        }
    }

    /// Reports a semantic/syntax error.
    ///
    /// Crossing `max_errors` additionally reports [`TOO_MANY_ERRORS`] once
    /// and latches the fatal flag; the parser driver is expected to stop
    /// feeding reductions once [`Diagnostics::is_fatal`] returns true.
    pub fn error(&mut self, filename: &str, line: u32, message: impl Into<Cow<'static, str>>, max_errors: u32) {
        self.errors += 1;
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            line,
            message: message.into(),
        };
        self.sink.emit(filename, &diagnostic);
        self.history.push(diagnostic);
        if self.errors > max_errors && !self.fatal {
            self.fatal = true;
            let giving_up = Diagnostic {
                severity: Severity::Error,
                line,
                message: Cow::Borrowed(TOO_MANY_ERRORS),
            };
            self.sink.emit(filename, &giving_up);
            self.history.push(giving_up);
        }
    }

    pub fn warning(&mut self, filename: &str, line: u32, message: impl Into<Cow<'static, str>>) {
        self.warnings += 1;
        let diagnostic = Diagnostic {
            severity: Severity::Warning,
            line,
            message: message.into(),
        };
        self.sink.emit(filename, &diagnostic);
        self.history.push(diagnostic);
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }

    /// True once the error count exceeded the configured maximum.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Every diagnostic reported so far, in order.
    pub fn history(&self) -> &[Diagnostic] {
        &self.history
    }
}

/// Borrowed view of the diagnostics plus the unit's filename and error
/// limit, threaded into operations that report.
pub struct Reporter<'a> {
    diags: &'a mut Diagnostics,
    filename: &'a str,
    max_errors: u32,
}

impl<'a> Reporter<'a> {
    pub fn new(diags: &'a mut Diagnostics, filename: &'a str, max_errors: u32) -> Self {
        Self {
            diags,
            filename,
            max_errors,
        }
    }

    pub fn error(&mut self, line: u32, message: impl Into<Cow<'static, str>>) {
        self.diags.error(self.filename, line, message, self.max_errors);
    }

    pub fn warning(&mut self, line: u32, message: impl Into<Cow<'static, str>>) {
        self.diags.warning(self.filename, line, message);
    }

    /// "Condition is always true/false".
    pub fn warning_condition_is_always(&mut self, line: u32, value: bool) {
        self.warning(line, format!("Condition is always {value}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_and_warnings_are_counted_separately() {
        let (sink, _handle) = CollectSink::new();
        let mut diags = Diagnostics::new(Box::new(sink));
        diags.error("t.bas", 1, "boom", 20);
        diags.warning("t.bas", 2, "hmm");
        diags.warning("t.bas", 3, "hmm again");
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 2);
        assert!(!diags.is_fatal());
    }

    #[test]
    fn crossing_the_error_limit_is_fatal_once() {
        let (sink, handle) = CollectSink::new();
        let mut diags = Diagnostics::new(Box::new(sink));
        diags.error("t.bas", 1, "first", 1);
        assert!(!diags.is_fatal());
        diags.error("t.bas", 2, "second", 1);
        assert!(diags.is_fatal());
        diags.error("t.bas", 3, "third", 1);
        let lines = handle.borrow();
        assert_eq!(lines.iter().filter(|l| l.contains(TOO_MANY_ERRORS)).count(), 1);
    }

    #[test]
    fn rendering_uses_filename_line_message() {
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            line: 12,
            message: Cow::Borrowed("Undeclared variable \"a\""),
        };
        assert_eq!(diagnostic.render("prog.bas"), "prog.bas:12: Undeclared variable \"a\"");
    }
}
