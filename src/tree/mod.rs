//! tree — рекурсивный драйвер B+tree поверх PageStore.
//!
//! Любая мутация copy-on-write: спуск по указателям до листа, сборка нового
//! листа, затем пересборка каждого предка свежей страницей. Split и merge
//! всплывают снизу вверх; рост и усадка высоты происходят только на корне.
//!
//! Мутация атомарна относительно хранилища: вытесненные страницы не
//! освобождаются по ходу спуска, а накапливаются и отпускаются только после
//! публикации нового корня. Если публикация любой страницы провалилась,
//! освобождаются свежеопубликованные страницы этой мутации, и прежний корень
//! остаётся целиком читаемым. Между мутациями число живых страниц в
//! хранилище равно числу узлов дерева.

mod delete;
mod insert;

use anyhow::{anyhow, Result};
use log::{debug, warn};

use crate::consts::{BNODE_LEAF, BNODE_NODE, BTREE_MAX_KEY_SIZE, BTREE_MAX_VALUE_SIZE, BTREE_PAGE_SIZE};
use crate::metrics::{record_page_freed, record_page_published, record_root_grow, record_root_shrink};
use crate::node::{lookup_le, node_append_kv, BNode};
use crate::store::PageStore;

use delete::tree_delete;
use insert::{node_split, tree_insert};

/// B+tree над произвольным страничным хранилищем.
pub struct BTree<S: PageStore> {
    root: u64,
    pub store: S,
    // вытесненные текущей мутацией страницы: освобождаются на commit
    staged_free: Vec<u64>,
    // опубликованные текущей мутацией страницы: освобождаются на rollback
    fresh: Vec<u64>,
}

impl<S: PageStore> BTree<S> {
    /// Создать дерево в пустом хранилище.
    ///
    /// Корень — лист с единственной сентинел-записью (пустой ключ, пустое
    /// значение): в дереве всегда существует минимальный ключ, и lookup_le
    /// разрешается в валидный слот на любом узле. Пользовательские ключи
    /// поэтому непустые.
    pub fn new(store: S) -> Result<Self> {
        let mut tree = BTree {
            root: 0,
            store,
            staged_free: Vec::new(),
            fresh: Vec::new(),
        };
        let mut root = BNode::scratch();
        root.set_header(BNODE_LEAF, 1);
        node_append_kv(&mut root, 0, 0, b"", b"");
        tree.root = tree.publish(&root)?;
        tree.commit()?;
        debug!("btree: created, root={}", tree.root);
        Ok(tree)
    }

    /// Открыть дерево по ранее опубликованному корню.
    pub fn open(store: S, root: u64) -> Result<Self> {
        let tree = BTree {
            root,
            store,
            staged_free: Vec::new(),
            fresh: Vec::new(),
        };
        tree.fetch(root)?; // корень обязан декодироваться как узел
        Ok(tree)
    }

    /// Текущий page id корня.
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Высота дерева (1 — корень-лист). Спуск по левому краю.
    pub fn height(&self) -> Result<usize> {
        let mut h = 1;
        let mut node = self.fetch(self.root)?;
        while node.btype() == BNODE_NODE {
            node = self.fetch(node.get_ptr(0))?;
            h += 1;
        }
        Ok(h)
    }

    /// Точечный поиск. Пустой или сверхдлинный ключ храниться не может,
    /// поэтому разрешается в None без обращения к дереву.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() || key.len() > BTREE_MAX_KEY_SIZE {
            return Ok(None);
        }
        self.get_at(self.root, key)
    }

    fn get_at(&self, pid: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let node = self.fetch(pid)?;
        let idx = lookup_le(&node, key);
        if node.btype() == BNODE_LEAF {
            if node.get_key(idx) == key {
                Ok(Some(node.get_val(idx).to_vec()))
            } else {
                Ok(None)
            }
        } else {
            self.get_at(node.get_ptr(idx), key)
        }
    }

    /// Вставить или обновить ключ (upsert). Границы размеров проверяются на
    /// входе; при любой ошибке дерево остаётся в прежнем состоянии.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(anyhow!("empty key is reserved"));
        }
        if key.len() > BTREE_MAX_KEY_SIZE {
            return Err(anyhow!(
                "key too long: {} > {}",
                key.len(),
                BTREE_MAX_KEY_SIZE
            ));
        }
        if val.len() > BTREE_MAX_VALUE_SIZE {
            return Err(anyhow!(
                "value too long: {} > {}",
                val.len(),
                BTREE_MAX_VALUE_SIZE
            ));
        }

        match self.insert_tree(key, val) {
            Ok(()) => self.commit(),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn insert_tree(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        let old_root = self.root;
        let root = self.fetch(old_root)?;
        let grown = tree_insert(self, &root, key, val)?;
        let parts = node_split(grown);
        self.stage_free(old_root);

        if parts.len() == 1 {
            self.root = self.publish(&parts[0])?;
        } else {
            // рост высоты: новый internal-корень поверх частей старого
            let mut pids = Vec::with_capacity(parts.len());
            for part in &parts {
                pids.push(self.publish(part)?);
            }
            let mut new_root = BNode::scratch();
            new_root.set_header(BNODE_NODE, parts.len());
            for (i, part) in parts.iter().enumerate() {
                node_append_kv(&mut new_root, i, pids[i], part.get_key(0), b"");
            }
            self.root = self.publish(&new_root)?;
            record_root_grow();
            debug!(
                "btree: root split into {} parts, height +1, root={}",
                parts.len(),
                self.root
            );
        }
        Ok(())
    }

    /// Обновить ключ. Семантика upsert, идентична insert: обе операции
    /// публичного API прописывают last-write-wins.
    pub fn update(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.insert(key, val)
    }

    /// Удалить ключ. Ok(false) — ключа не было: идемпотентный no-op,
    /// страницы не переписываются, корень не меняется.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if key.is_empty() || key.len() > BTREE_MAX_KEY_SIZE {
            return Ok(false);
        }
        match self.delete_tree(key) {
            Ok(found) => {
                self.commit()?;
                Ok(found)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn delete_tree(&mut self, key: &[u8]) -> Result<bool> {
        let old_root = self.root;
        let root = self.fetch(old_root)?;
        let updated = match tree_delete(self, &root, key)? {
            Some(node) => node,
            None => return Ok(false),
        };
        self.stage_free(old_root);

        if updated.btype() == BNODE_NODE && updated.nkeys() == 1 {
            // усадка высоты: internal-корень с единственным ребёнком
            // схлопывается, ребёнок становится корнем
            self.root = updated.get_ptr(0);
            record_root_shrink();
            debug!("btree: root collapsed to child, height -1, root={}", self.root);
        } else {
            self.root = self.publish(&updated)?;
        }
        Ok(true)
    }

    // ----- внутренний оборот страниц -----

    pub(crate) fn fetch(&self, pid: u64) -> Result<BNode> {
        let mut buf = vec![0u8; BTREE_PAGE_SIZE];
        self.store.read_page(pid, &mut buf)?;
        BNode::from_page(&buf)
    }

    pub(crate) fn publish(&mut self, node: &BNode) -> Result<u64> {
        if node.nbytes() > BTREE_PAGE_SIZE {
            return Err(anyhow!(
                "attempt to publish oversize node: {} bytes",
                node.nbytes()
            ));
        }
        let pid = self.store.alloc_page(node.as_page())?;
        record_page_published();
        self.fresh.push(pid);
        Ok(pid)
    }

    /// Отложить освобождение вытесненной страницы до конца мутации: пока
    /// новый корень не опубликован, старый граф обязан оставаться читаемым.
    pub(crate) fn stage_free(&mut self, pid: u64) {
        self.staged_free.push(pid);
    }

    /// Мутация состоялась: отпустить вытесненные страницы.
    fn commit(&mut self) -> Result<()> {
        self.fresh.clear();
        for pid in std::mem::take(&mut self.staged_free) {
            self.store.free_page(pid)?;
            record_page_freed();
        }
        Ok(())
    }

    /// Мутация провалилась: прежний корень остаётся действующим, свежие
    /// страницы — осиротевшие, возвращаются хранилищу.
    fn rollback(&mut self) {
        self.staged_free.clear();
        for pid in std::mem::take(&mut self.fresh) {
            match self.store.free_page(pid) {
                Ok(()) => record_page_freed(),
                Err(e) => warn!("btree: rollback could not release page {}: {:#}", pid, e),
            }
        }
    }
}
