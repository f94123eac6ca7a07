//! Удаление: рекурсивный спуск до листа + merge недозаполненных узлов на
//! обратном пути.

use std::sync::OnceLock;

use anyhow::Result;
use log::debug;

use crate::consts::{BNODE_LEAF, BNODE_NODE, BTREE_PAGE_SIZE, HEADER};
use crate::metrics::record_merge;
use crate::node::{leaf_delete, lookup_le, node_append_kv, node_append_range, BNode};
use crate::store::PageStore;

use super::insert::node_replace_kid_n;
use super::BTree;

/// Порог недозаполненности: ребёнок размером не выше порога пытается
/// слиться с соседом. ENV B1_MERGE_THRESHOLD_BYTES (клампится в
/// [HEADER, страница/2]); по умолчанию четверть страницы.
fn merge_threshold_bytes() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("B1_MERGE_THRESHOLD_BYTES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.clamp(HEADER, BTREE_PAGE_SIZE / 2))
            .unwrap_or(BTREE_PAGE_SIZE / 4)
    })
}

enum MergeWith {
    Left(BNode),
    Right(BNode),
}

/// Удалить key из поддерева node. None — ключа нет, ни одна страница не
/// тронута. Some(new) — новый узел поддерева (возможно недозаполненный;
/// merge выполняет родитель, на корне — усадка высоты).
pub(crate) fn tree_delete<S: PageStore>(
    tree: &mut BTree<S>,
    node: &BNode,
    key: &[u8],
) -> Result<Option<BNode>> {
    let idx = lookup_le(node, key);
    if node.btype() == BNODE_LEAF {
        if node.get_key(idx) != key {
            return Ok(None);
        }
        let mut new = BNode::scratch();
        leaf_delete(&mut new, node, idx);
        Ok(Some(new))
    } else {
        node_delete(tree, node, idx, key)
    }
}

/// Шаг internal-узла: спуск в ребёнка idx, затем пересборка себя — с merge
/// обновлённого ребёнка, если тот стал слишком мал.
fn node_delete<S: PageStore>(
    tree: &mut BTree<S>,
    node: &BNode,
    idx: usize,
    key: &[u8],
) -> Result<Option<BNode>> {
    let kid_pid = node.get_ptr(idx);
    let kid = tree.fetch(kid_pid)?;
    let updated = match tree_delete(tree, &kid, key)? {
        Some(n) => n,
        None => return Ok(None),
    };
    tree.stage_free(kid_pid);

    let mut new = BNode::scratch();
    match should_merge(tree, node, idx, &updated)? {
        Some(MergeWith::Left(sib)) => {
            let merged = node_merge(&sib, &updated);
            tree.stage_free(node.get_ptr(idx - 1));
            let pid = tree.publish(&merged)?;
            node_replace_2_kid(&mut new, node, idx - 1, pid, merged.get_key(0));
            record_merge();
            debug!("btree: merged child into left sibling, pid={}", pid);
        }
        Some(MergeWith::Right(sib)) => {
            let merged = node_merge(&updated, &sib);
            tree.stage_free(node.get_ptr(idx + 1));
            let pid = tree.publish(&merged)?;
            node_replace_2_kid(&mut new, node, idx, pid, merged.get_key(0));
            record_merge();
            debug!("btree: merged right sibling into child, pid={}", pid);
        }
        None => {
            if updated.nkeys() == 0 {
                // ребёнок опустел, соседа нет: такое возможно только у
                // родителя с единственным слотом. Пустой internal всплывает
                // выше и вливается в соседа там; до корня он не доходит —
                // левейшее поддерево всегда держит сентинел.
                debug_assert!(node.nkeys() == 1 && idx == 0);
                new.set_header(BNODE_NODE, 0);
            } else {
                let pid = tree.publish(&updated)?;
                node_replace_kid_n(&mut new, node, idx, &[(pid, updated.get_key(0))]);
            }
        }
    }
    Ok(Some(new))
}

/// Решение о merge: ребёнок мельче порога и суммарный размер с соседом
/// (за вычетом одного header) помещается в страницу. Левый сосед в
/// приоритете.
fn should_merge<S: PageStore>(
    tree: &BTree<S>,
    node: &BNode,
    idx: usize,
    updated: &BNode,
) -> Result<Option<MergeWith>> {
    if updated.nbytes() > merge_threshold_bytes() {
        return Ok(None);
    }
    if idx > 0 {
        let sib = tree.fetch(node.get_ptr(idx - 1))?;
        if sib.nbytes() + updated.nbytes() - HEADER <= BTREE_PAGE_SIZE {
            return Ok(Some(MergeWith::Left(sib)));
        }
    }
    if idx + 1 < node.nkeys() {
        let sib = tree.fetch(node.get_ptr(idx + 1))?;
        if sib.nbytes() + updated.nbytes() - HEADER <= BTREE_PAGE_SIZE {
            return Ok(Some(MergeWith::Right(sib)));
        }
    }
    Ok(None)
}

/// Склейка двух соседей (left предшествует right по порядку ключей).
/// Разделительные ключи internal-записей остаются корректными: каждая
/// запись несёт нижнюю границу собственного поддерева.
fn node_merge(left: &BNode, right: &BNode) -> BNode {
    let mut new = BNode::scratch();
    new.set_header(left.btype(), left.nkeys() + right.nkeys());
    node_append_range(&mut new, left, 0, 0, left.nkeys());
    node_append_range(&mut new, right, left.nkeys(), 0, right.nkeys());
    debug_assert!(new.nbytes() <= BTREE_PAGE_SIZE);
    new
}

/// Дуал replace_kid_n: записи idx и idx+1 заменяются одной (pid, key).
fn node_replace_2_kid(new: &mut BNode, old: &BNode, idx: usize, pid: u64, key: &[u8]) {
    new.set_header(BNODE_NODE, old.nkeys() - 1);
    node_append_range(new, old, 0, 0, idx);
    node_append_kv(new, idx, pid, key, b"");
    node_append_range(new, old, idx + 1, idx + 2, old.nkeys() - idx - 2);
}
