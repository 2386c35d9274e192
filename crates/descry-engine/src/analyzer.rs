//! Post-quiescence analysis hook.

use descry_core::ReferenceTable;

use crate::document::ListingDocument;
use crate::report::ReportSink;

/// What an analyzer gets to work with once the queue has drained.
pub struct AnalyzerContext<'a> {
    pub document: &'a mut ListingDocument,
    pub references: &'a ReferenceTable,
    pub sink: &'a mut dyn ReportSink,
}

/// A pass that runs when the engine reaches quiescence.
///
/// `analyze` runs once after the first full disassembly; `analyze_fast`
/// runs on every later busy→idle transition. The facade owns termination:
/// passes repeat until one produces no new listing items.
pub trait Analyzer {
    fn analyze(&mut self, ctx: &mut AnalyzerContext<'_>);

    fn analyze_fast(&mut self, ctx: &mut AnalyzerContext<'_>) {
        self.analyze(ctx);
    }
}
