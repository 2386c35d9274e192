//! Flat raw-image loader.

use descry_core::{Address, BufferView, Offset, Segment, SegmentKind};

use crate::Loader;

/// Loads a raw image mapped contiguously at a base address.
///
/// By default the whole image is one `CODE` segment named `flat` with the
/// entry point at the base; both can be overridden, and additional segments
/// (for data or a second code region) can be declared over the same image.
pub struct FlatLoader {
    image: Vec<u8>,
    entry: Address,
    assembler: String,
    segments: Vec<Segment>,
}

impl FlatLoader {
    /// Maps `image` at `base` as a single code segment.
    pub fn new(image: Vec<u8>, base: Address, assembler: impl Into<String>) -> Self {
        let size = image.len() as u64;
        Self {
            image,
            entry: base,
            assembler: assembler.into(),
            segments: vec![Segment::new("flat", 0, base, size, SegmentKind::CODE)],
        }
    }

    /// Maps `image` at `base` with caller-declared segments.
    ///
    /// Segment offsets are relative to the start of the image.
    pub fn with_segments(
        image: Vec<u8>,
        base: Address,
        assembler: impl Into<String>,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            image,
            entry: segments.first().map(|s| s.address).unwrap_or(base),
            assembler: assembler.into(),
            segments,
        }
    }

    /// Overrides the entry point.
    pub fn entry(mut self, entry: Address) -> Self {
        self.entry = entry;
        self
    }
}

impl Loader for FlatLoader {
    fn view(&self, address: Address) -> BufferView<'_> {
        match self.offset(address) {
            Some(offset) => {
                let segment_end = self
                    .segments
                    .iter()
                    .find(|s| s.contains(address))
                    .map(|s| s.offset + s.size)
                    .unwrap_or(self.image.len() as u64);
                let end = segment_end.min(self.image.len() as u64) as usize;
                BufferView::new(&self.image[offset as usize..end])
            }
            None => BufferView::empty(),
        }
    }

    fn offset(&self, address: Address) -> Option<Offset> {
        self.segments
            .iter()
            .find_map(|s| s.offset_of(address))
            .filter(|&offset| offset < self.image.len() as u64)
    }

    fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn entry_point(&self) -> Address {
        self.entry
    }

    fn assembler_id(&self) -> &str {
        &self.assembler
    }
}
