//! Операции над листом: insert/update/delete одной записи.
//!
//! Все три copy-on-write: старый узел не трогается, результат собирается в
//! новый буфер из префикса, изменённой записи и суффикса. Переполнение
//! результата допустимо — его разрешает split на уровне дерева.

use crate::consts::BNODE_LEAF;
use crate::node::{node_append_kv, node_append_range, BNode};

/// new = old с записью (key, val), вставленной в позицию idx.
pub fn leaf_insert(new: &mut BNode, old: &BNode, idx: usize, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys() + 1);
    node_append_range(new, old, 0, 0, idx);
    node_append_kv(new, idx, 0, key, val);
    node_append_range(new, old, idx + 1, idx, old.nkeys() - idx);
}

/// new = old с заменённой записью idx.
pub fn leaf_update(new: &mut BNode, old: &BNode, idx: usize, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys());
    node_append_range(new, old, 0, 0, idx);
    node_append_kv(new, idx, 0, key, val);
    node_append_range(new, old, idx + 1, idx + 1, old.nkeys() - idx - 1);
}

/// new = old без записи idx.
pub fn leaf_delete(new: &mut BNode, old: &BNode, idx: usize) {
    new.set_header(BNODE_LEAF, old.nkeys() - 1);
    node_append_range(new, old, 0, 0, idx);
    node_append_range(new, old, idx, idx + 1, old.nkeys() - idx - 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(entries: &[(&[u8], &[u8])]) -> BNode {
        let mut n = BNode::scratch();
        n.set_header(BNODE_LEAF, entries.len());
        for (i, (k, v)) in entries.iter().enumerate() {
            node_append_kv(&mut n, i, 0, k, v);
        }
        n
    }

    #[test]
    fn insert_then_delete_restores_bytes() {
        let old = leaf(&[(b"", b""), (b"aa", b"11"), (b"cc", b"33")]);

        let mut grown = BNode::scratch();
        leaf_insert(&mut grown, &old, 2, b"bb", b"22");
        assert_eq!(grown.nkeys(), 4);
        assert_eq!(grown.get_key(2), b"bb");

        let mut back = BNode::scratch();
        leaf_delete(&mut back, &grown, 2);
        assert_eq!(back.as_page(), old.as_page());
    }

    #[test]
    fn update_replaces_value_in_place() {
        let old = leaf(&[(b"", b""), (b"k", b"old")]);
        let mut new = BNode::scratch();
        leaf_update(&mut new, &old, 1, b"k", b"newer");
        assert_eq!(new.nkeys(), 2);
        assert_eq!(new.get_val(1), b"newer");
        assert_eq!(new.get_key(0), b"");
    }
}
