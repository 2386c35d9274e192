//! Status and problem reporting channel.

use std::cell::RefCell;
use std::rc::Rc;

/// Abstract channel for engine progress and diagnostics.
///
/// The engine emits `status` for coarse progress and `problem` for
/// recoverable defects (undecodable bytes, unresolvable control-flow
/// targets). No problem terminates disassembly.
pub trait ReportSink {
    fn status(&mut self, text: &str);
    fn problem(&mut self, text: &str);
}

/// Default sink routing to the `log` facade.
pub struct LogSink;

impl ReportSink for LogSink {
    fn status(&mut self, text: &str) {
        log::info!("{}", text);
    }

    fn problem(&mut self, text: &str) {
        log::warn!("{}", text);
    }
}

/// Recording sink, mainly for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub statuses: Vec<String>,
    pub problems: Vec<String>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared handle usable both as a sink and for inspection.
    pub fn shared() -> Rc<RefCell<MemorySink>> {
        Rc::new(RefCell::new(MemorySink::new()))
    }
}

impl ReportSink for MemorySink {
    fn status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn problem(&mut self, text: &str) {
        self.problems.push(text.to_string());
    }
}

impl ReportSink for Rc<RefCell<MemorySink>> {
    fn status(&mut self, text: &str) {
        self.borrow_mut().status(text);
    }

    fn problem(&mut self, text: &str) {
        self.borrow_mut().problem(text);
    }
}
