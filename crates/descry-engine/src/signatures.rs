//! Optional signature-database hook for pattern-matched function naming.

use descry_core::BufferView;

/// A pattern hit inside a searched view.
#[derive(Debug, Clone)]
pub struct SignatureMatch {
    /// Offset of the match from the start of the view.
    pub offset: usize,
    /// Matched length in bytes.
    pub len: usize,
    /// Name to apply to the matched function.
    pub name: String,
}

/// External signature store searched after quiescence.
///
/// The engine walks each code segment's bytes through `search`; every
/// reported match whose address carries a function gets that function
/// renamed and locked.
pub trait SignatureDatabase {
    fn search(&self, view: &BufferView<'_>, callback: &mut dyn FnMut(SignatureMatch));
}
