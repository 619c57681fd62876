use std::ops::{Deref, DerefMut};

pub const PAGE_SIZE: usize = 4096;

pub type PageId = u32;

/// Sentinel id for a frame that currently holds no page.
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// A fixed-size page of raw bytes. The pool treats the contents as opaque;
/// layout is the concern of whatever structure lives inside the page.
#[derive(Clone)]
pub struct Page([u8; PAGE_SIZE]);

impl Page {
    pub fn new() -> Self {
        Page([0; PAGE_SIZE])
    }

    /// Zero the page, e.g. when a frame is handed out for a fresh page.
    pub fn reset(&mut self) {
        self.0.fill(0);
    }

    pub fn copy_from(&mut self, other: &Page) {
        self.0.copy_from_slice(&other.0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Page {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Page {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page_is_zeroed() {
        let page = Page::new();
        assert_eq!(page.len(), PAGE_SIZE);
        assert!(page.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reset_clears_contents() {
        let mut page = Page::new();
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;
        page.reset();
        assert!(page.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_copy_from() {
        let mut src = Page::new();
        src[42] = 7;
        let mut dst = Page::new();
        dst.copy_from(&src);
        assert_eq!(dst[42], 7);
    }
}
