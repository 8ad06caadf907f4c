//! Anonymous, chunk-aligned staging memory for write traffic.
//!
//! The region is a private anonymous mapping. It starts at exactly one
//! chunk and grows one chunk at a time. On Linux growth goes through
//! `mremap(MREMAP_MAYMOVE)`, so existing bytes are never copied in
//! userspace; elsewhere a larger mapping is created and the old contents
//! copied over.

use std::io;

use memmap2::MmapMut;

/// Growable anonymous memory region sized in whole chunks.
#[derive(Debug)]
pub struct StagingRegion {
    map: Option<MmapMut>,
    chunk_size: usize,
}

impl StagingRegion {
    /// Create an unmapped region. Nothing is allocated until [`initialize`].
    ///
    /// [`initialize`]: StagingRegion::initialize
    pub fn new(chunk_size: usize) -> Self {
        Self {
            map: None,
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Current size in bytes, 0 while unmapped.
    pub fn capacity(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// Map a fresh region of exactly one chunk.
    pub fn initialize(&mut self) -> io::Result<()> {
        if self.chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk size must be positive",
            ));
        }
        self.map = Some(MmapMut::map_anon(self.chunk_size)?);
        Ok(())
    }

    /// Grow the region by exactly one chunk. The base address may move.
    pub fn extend(&mut self) -> io::Result<()> {
        let Some(map) = self.map.as_mut() else {
            return self.initialize();
        };
        let new_len = map
            .len()
            .checked_add(self.chunk_size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "staging size overflow"))?;
        Self::grow(map, new_len)
    }

    #[cfg(target_os = "linux")]
    fn grow(map: &mut MmapMut, new_len: usize) -> io::Result<()> {
        use memmap2::RemapOptions;

        // SAFETY: `map` is borrowed mutably, so no slice into the old
        // mapping can outlive a move of its base address.
        unsafe { map.remap(new_len, RemapOptions::new().may_move(true)) }
    }

    #[cfg(not(target_os = "linux"))]
    fn grow(map: &mut MmapMut, new_len: usize) -> io::Result<()> {
        let mut grown = MmapMut::map_anon(new_len)?;
        grown[..map.len()].copy_from_slice(map);
        *map = grown;
        Ok(())
    }

    /// Unmap the region. A no-op when already released.
    pub fn release(&mut self) {
        self.map = None;
    }

    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.map.as_deref_mut().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_starts_unmapped() {
        let region = StagingRegion::new(16);
        assert!(!region.is_mapped());
        assert_eq!(region.capacity(), 0);
        assert!(region.as_slice().is_empty());
    }

    #[test]
    fn test_initialize_maps_one_chunk() {
        let mut region = StagingRegion::new(16);
        region.initialize().unwrap();
        assert_eq!(region.capacity(), 16);
        // Anonymous mappings are zero-filled
        assert!(region.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_extend_keeps_contents() {
        let mut region = StagingRegion::new(8);
        region.initialize().unwrap();
        region.as_mut_slice().copy_from_slice(b"abcdefgh");

        for expected in [16, 24, 32] {
            region.extend().unwrap();
            assert_eq!(region.capacity(), expected);
            assert_eq!(region.capacity() % region.chunk_size(), 0);
        }

        assert_eq!(&region.as_slice()[..8], b"abcdefgh");
        region.as_mut_slice()[24..32].copy_from_slice(b"ijklmnop");
        assert_eq!(&region.as_slice()[24..], b"ijklmnop");
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut region = StagingRegion::new(4);
        region.initialize().unwrap();
        region.release();
        assert_eq!(region.capacity(), 0);
        region.release();
        assert!(!region.is_mapped());
    }

    #[test]
    fn test_zero_chunk_size_fails() {
        let mut region = StagingRegion::new(0);
        assert!(region.initialize().is_err());
        assert_eq!(region.capacity(), 0);
    }
}
