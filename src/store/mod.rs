//! store — страничный коллаборатор дерева.
//!
//! Ядро общается с хранилищем через три операции:
//! - read_page: разыменовать page id в байты страницы;
//! - alloc_page: выделить свежий id под новую страницу (copy-on-write);
//! - free_page: освободить вытесненную страницу.
//!
//! Всё остальное — персистентность, free-лист, WAL, кэш — забота конкретной
//! реализации PageStore, не ядра. Опубликованная страница неизменяема:
//! ядро никогда не просит перезаписать существующий id.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::consts::BTREE_PAGE_SIZE;

pub trait PageStore {
    /// Прочитать страницу pid в буфер (ровно BTREE_PAGE_SIZE байт).
    /// Ошибка — если pid не выделялся или уже освобождён.
    fn read_page(&self, pid: u64, buf: &mut [u8]) -> Result<()>;

    /// Выделить новый page id и связать с ним данные. data не длиннее
    /// страницы; хвост до BTREE_PAGE_SIZE дополняется нулями.
    fn alloc_page(&mut self, data: &[u8]) -> Result<u64>;

    /// Освободить страницу: после вызова ядро к pid не обращается.
    fn free_page(&mut self, pid: u64) -> Result<()>;
}

/// In-memory арена страниц: BTreeMap pid -> буфер, id — монотонный счётчик.
/// Нулевой id не выдаётся (0 удобен как "нет страницы").
pub struct MemStore {
    pages: BTreeMap<u64, Box<[u8]>>,
    next_page_id: u64,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            pages: BTreeMap::new(),
            next_page_id: 1,
        }
    }

    /// Число живых (выделенных и не освобождённых) страниц.
    pub fn allocated(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, pid: u64) -> bool {
        self.pages.contains_key(&pid)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemStore {
    fn read_page(&self, pid: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != BTREE_PAGE_SIZE {
            return Err(anyhow!(
                "page buffer must be {} bytes, got {}",
                BTREE_PAGE_SIZE,
                buf.len()
            ));
        }
        let page = self
            .pages
            .get(&pid)
            .ok_or_else(|| anyhow!("page {} is not allocated", pid))?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn alloc_page(&mut self, data: &[u8]) -> Result<u64> {
        if data.len() > BTREE_PAGE_SIZE {
            return Err(anyhow!(
                "page data too large: {} > {}",
                data.len(),
                BTREE_PAGE_SIZE
            ));
        }
        let mut page = vec![0u8; BTREE_PAGE_SIZE];
        page[..data.len()].copy_from_slice(data);
        let pid = self.next_page_id;
        self.next_page_id += 1;
        self.pages.insert(pid, page.into_boxed_slice());
        Ok(pid)
    }

    fn free_page(&mut self, pid: u64) -> Result<()> {
        match self.pages.remove(&pid) {
            Some(_) => Ok(()),
            None => Err(anyhow!("free of unallocated page {}", pid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_read_free_cycle() -> Result<()> {
        let mut store = MemStore::new();
        let pid = store.alloc_page(b"hello")?;
        assert_eq!(pid, 1);
        assert_eq!(store.allocated(), 1);

        let mut buf = vec![0u8; BTREE_PAGE_SIZE];
        store.read_page(pid, &mut buf)?;
        assert_eq!(&buf[..5], b"hello");
        assert!(buf[5..].iter().all(|&b| b == 0));

        store.free_page(pid)?;
        assert_eq!(store.allocated(), 0);
        assert!(store.read_page(pid, &mut buf).is_err());
        assert!(store.free_page(pid).is_err());
        Ok(())
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() -> Result<()> {
        let mut store = MemStore::new();
        let a = store.alloc_page(b"a")?;
        store.free_page(a)?;
        let b = store.alloc_page(b"b")?;
        assert!(b > a);
        Ok(())
    }

    #[test]
    fn oversize_page_rejected() {
        let mut store = MemStore::new();
        let big = vec![0u8; BTREE_PAGE_SIZE + 1];
        assert!(store.alloc_page(&big).is_err());
    }
}
