//! Byte-offset to line-number conversion.
//!
//! Manifest source references use 1-based lines. The map stores the starting
//! byte offset of each line so any number of anchor lookups after one scan
//! are a binary search each.

/// Precomputed line-start offsets for one source file.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Starting byte offset of each line (`line_starts[0]` is always 0).
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Scan the source once, recording the offset following every `\n`.
    #[must_use]
    pub fn build(source: &[u8]) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.iter().enumerate() {
            if *byte == b'\n' {
                line_starts.push(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        Self { line_starts }
    }

    /// 1-based line containing `offset`: one more than the number of `\n`
    /// bytes at offsets strictly less than `offset`.
    #[must_use]
    pub fn line_at(&self, offset: u32) -> u32 {
        let starts_at_or_before = self.line_starts.partition_point(|start| *start <= offset);
        u32::try_from(starts_at_or_before).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
