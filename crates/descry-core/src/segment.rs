//! Program segments.

use bitflags::bitflags;

use crate::{Address, Offset};

bitflags! {
    /// Segment kind mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SegmentKind: u32 {
        const CODE = 0x0000_0001;
        const DATA = 0x0000_0002;
        const BSS  = 0x0000_0004;
    }
}

/// A named contiguous address range, immutable once published.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    /// Segment name (".text", ".data", ...).
    pub name: String,
    /// File offset of the segment's first byte.
    pub offset: Offset,
    /// Load address.
    pub address: Address,
    /// Size in bytes.
    pub size: u64,
    /// Kind mask.
    pub kind: SegmentKind,
}

impl Segment {
    /// Creates a new segment.
    pub fn new(
        name: impl Into<String>,
        offset: Offset,
        address: Address,
        size: u64,
        kind: SegmentKind,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            address,
            size,
            kind,
        }
    }

    /// One past the last address.
    pub fn end(&self) -> Address {
        self.address + self.size
    }

    /// Containment test for `[address, address + size)`.
    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address < self.end()
    }

    /// Returns true if the segment holds executable code.
    pub fn is_code(&self) -> bool {
        self.kind.contains(SegmentKind::CODE)
    }

    /// Returns true if the segment holds initialized data.
    pub fn is_data(&self) -> bool {
        self.kind.contains(SegmentKind::DATA)
    }

    /// Returns true if the segment has no backing bytes in the image.
    pub fn is_bss(&self) -> bool {
        self.kind.contains(SegmentKind::BSS)
    }

    /// Translates an address inside this segment to its file offset.
    pub fn offset_of(&self, address: Address) -> Option<Offset> {
        if self.contains(address) && !self.is_bss() {
            Some(self.offset + (address - self.address))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment() {
        let seg = Segment::new(".text", 0, 0x1000, 0x100, SegmentKind::CODE);

        assert!(seg.contains(0x1000));
        assert!(seg.contains(0x10FF));
        assert!(!seg.contains(0x1100));
        assert!(!seg.contains(0x0FFF));
        assert_eq!(seg.end(), 0x1100);
    }

    #[test]
    fn test_offset_translation() {
        let seg = Segment::new(".data", 0x400, 0x2000, 0x80, SegmentKind::DATA);
        assert_eq!(seg.offset_of(0x2010), Some(0x410));
        assert_eq!(seg.offset_of(0x3000), None);

        let bss = Segment::new(".bss", 0, 0x3000, 0x80, SegmentKind::BSS);
        assert_eq!(bss.offset_of(0x3000), None);
    }
}
