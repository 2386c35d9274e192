//! The loader contract consumed by the engine.

use descry_core::{Address, BufferView, Offset, Segment};

/// A loaded binary image.
///
/// Loaders publish segments once at load time and translate addresses into
/// byte views; the engine does not otherwise introspect loader state.
pub trait Loader {
    /// A view anchored at `address`, running to the end of the containing
    /// mapped region. Unmapped addresses return an empty view (`eob()`).
    fn view(&self, address: Address) -> BufferView<'_>;

    /// Translates an address to its file offset, or `None` when the address
    /// has no backing bytes.
    fn offset(&self, address: Address) -> Option<Offset>;

    /// Segments published at load time.
    fn segments(&self) -> &[Segment];

    /// Program entry point.
    fn entry_point(&self) -> Address;

    /// Identifier of the architecture plug-in to bind.
    fn assembler_id(&self) -> &str;
}
