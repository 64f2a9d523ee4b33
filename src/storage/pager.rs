//! Maps a database file into a bounded set of in-memory page slots.
//!
//! Pages are loaded lazily and never evicted: once a page is read in, it
//! stays resident until the pager is closed. That keeps the implementation
//! simple at the cost of capping total database size at
//! `max_pages * PAGE_SIZE` (documented limitation, see `Pager::max_pages`).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::err;
use crate::errors::Error;
use crate::storage::btree::{initialize_leaf_node, Node, PAGE_SIZE};

pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    max_pages: usize,
    row_size: usize,
    pages: Vec<Option<Node>>,
}

impl Pager {
    pub fn open<P: AsRef<Path>>(path: P, row_size: usize, max_pages: usize) -> Result<Self, Error> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_length = file.seek(SeekFrom::End(0))?;
        if file_length as usize % PAGE_SIZE != 0 {
            return Err(err!(
                IOFatal,
                "db file length {} is not a multiple of page size {}",
                file_length,
                PAGE_SIZE
            ));
        }
        let num_pages = (file_length as usize / PAGE_SIZE) as u32;
        let mut pages = Vec::with_capacity(max_pages);
        pages.resize_with(max_pages, || None);
        Ok(Pager {
            file,
            file_length,
            num_pages,
            max_pages,
            row_size,
            pages,
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Returns a reference to the page, loading it from disk (or allocating
    /// a fresh zeroed buffer for a never-written page) if it is not already
    /// resident.
    pub fn get(&mut self, page_num: u32) -> Result<&Node, Error> {
        self.ensure_loaded(page_num)?;
        Ok(self.pages[page_num as usize].as_ref().unwrap())
    }

    pub fn get_mut(&mut self, page_num: u32) -> Result<&mut Node, Error> {
        self.ensure_loaded(page_num)?;
        Ok(self.pages[page_num as usize].as_mut().unwrap())
    }

    fn ensure_loaded(&mut self, page_num: u32) -> Result<(), Error> {
        if page_num as usize >= self.max_pages {
            return Err(err!(
                IOFatal,
                "page number {} exceeds max_pages {}",
                page_num,
                self.max_pages
            ));
        }
        if self.pages[page_num as usize].is_none() {
            let mut buf = [0u8; PAGE_SIZE];
            if page_num < self.num_pages {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut buf)?;
            }
            let mut node = Node::new(buf, self.row_size);
            if page_num >= self.num_pages {
                // Brand new page: give it a sane default so callers that
                // forget to initialize it don't dereference garbage.
                initialize_leaf_node(&mut node);
                self.num_pages = page_num + 1;
            }
            self.pages[page_num as usize] = Some(node);
        }
        Ok(())
    }

    /// Installs a freshly constructed node at `page_num`, bumping `num_pages`
    /// if this extends the file.
    pub fn put(&mut self, page_num: u32, node: Node) -> Result<(), Error> {
        if page_num as usize >= self.max_pages {
            return Err(err!(
                IOFatal,
                "page number {} exceeds max_pages {}",
                page_num,
                self.max_pages
            ));
        }
        if page_num >= self.num_pages {
            self.num_pages = page_num + 1;
        }
        self.pages[page_num as usize] = Some(node);
        Ok(())
    }

    pub fn get_unused_page_num(&self) -> u32 {
        self.num_pages
    }

    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        if let Some(node) = &self.pages[page_num as usize] {
            self.file
                .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
            self.file.write_all(node.as_slice())?;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), Error> {
        for page_num in 0..self.num_pages {
            self.flush(page_num)?;
        }
        self.file.flush()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.flush_all()?;
        self.file.sync_all()?;
        self.file_length = self.num_pages as u64 * PAGE_SIZE as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_file_has_no_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let pager = Pager::open(tmp.path(), 291, 100).unwrap();
        assert_eq!(pager.num_pages(), 0);
    }

    #[test]
    fn get_allocates_and_persists_across_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut pager = Pager::open(tmp.path(), 291, 100).unwrap();
            let node = pager.get_mut(0).unwrap();
            node.set_leaf_node_num_cells(7);
            pager.close().unwrap();
        }
        let mut pager = Pager::open(tmp.path(), 291, 100).unwrap();
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.get(0).unwrap().leaf_node_num_cells(), 7);
    }

    #[test]
    fn page_beyond_max_pages_is_fatal() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path(), 291, 4).unwrap();
        assert!(pager.get(4).is_err());
    }
}
