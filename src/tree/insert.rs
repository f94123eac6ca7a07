//! Вставка: рекурсивный спуск до листа + split переполненных узлов на
//! обратном пути.

use anyhow::Result;
use log::debug;

use crate::consts::{BNODE_LEAF, BNODE_NODE, BTREE_PAGE_SIZE, HEADER};
use crate::metrics::record_split;
use crate::node::{
    leaf_insert, leaf_update, lookup_le, node_append_kv, node_append_range, BNode,
};
use crate::store::PageStore;

use super::BTree;

/// Вставить key/val в поддерево node. Возвращает новый, ещё не
/// опубликованный узел; он может быть переполнен — split на вызывающем.
pub(crate) fn tree_insert<S: PageStore>(
    tree: &mut BTree<S>,
    node: &BNode,
    key: &[u8],
    val: &[u8],
) -> Result<BNode> {
    let idx = lookup_le(node, key);
    let mut new = BNode::scratch();
    if node.btype() == BNODE_LEAF {
        if node.get_key(idx) == key {
            leaf_update(&mut new, node, idx, key, val);
        } else {
            leaf_insert(&mut new, node, idx + 1, key, val);
        }
    } else {
        // спуск в ребёнка idx, затем пересборка этого узла с его заменой
        let kid_pid = node.get_ptr(idx);
        let kid = tree.fetch(kid_pid)?;
        let kid = tree_insert(tree, &kid, key, val)?;
        let parts = node_split(kid);
        tree.stage_free(kid_pid);

        let mut pids = Vec::with_capacity(parts.len());
        for part in &parts {
            pids.push(tree.publish(part)?);
        }
        let kids: Vec<(u64, &[u8])> = parts
            .iter()
            .enumerate()
            .map(|(i, part)| (pids[i], part.get_key(0)))
            .collect();
        node_replace_kid_n(&mut new, node, idx, &kids);
    }
    Ok(new)
}

/// new = old с записью idx, заменённой на kids (1..=3 опубликованных
/// ребёнка: page id + первый ключ каждого).
pub(crate) fn node_replace_kid_n(
    new: &mut BNode,
    old: &BNode,
    idx: usize,
    kids: &[(u64, &[u8])],
) {
    new.set_header(BNODE_NODE, old.nkeys() + kids.len() - 1);
    node_append_range(new, old, 0, 0, idx);
    for (i, (pid, key)) in kids.iter().enumerate() {
        node_append_kv(new, idx + i, *pid, key, b"");
    }
    node_append_range(new, old, idx + kids.len(), idx + 1, old.nkeys() - idx - 1);
}

/// Разрезать переполненный узел на 1..=3 части, каждая в пределах страницы.
///
/// Фронтальный скан с накоплением стоимости записей: первая часть
/// останавливается у половины общего размера, остальные — у полной страницы.
/// Узел из одной записи не режется (худший случай гарантирован константами
/// формата). Трёх частей всегда достаточно: узел переполняется максимум на
/// одну запись относительно валидной страницы.
pub(crate) fn node_split(node: BNode) -> Vec<BNode> {
    if node.nbytes() <= BTREE_PAGE_SIZE {
        return vec![node];
    }
    let total = node.nbytes();
    let nkeys = node.nkeys();

    let mut parts = Vec::with_capacity(3);
    let mut start = 0;
    while start < nkeys {
        let budget = if parts.is_empty() {
            (total / 2).min(BTREE_PAGE_SIZE)
        } else {
            BTREE_PAGE_SIZE
        };
        let mut size = HEADER;
        let mut count = 0;
        while start + count < nkeys {
            let cost = node.entry_cost(start + count);
            if count > 0 && size + cost > budget {
                break;
            }
            size += cost;
            count += 1;
        }

        let mut part = BNode::scratch();
        part.set_header(node.btype(), count);
        node_append_range(&mut part, &node, 0, start, count);
        debug_assert!(part.nbytes() <= BTREE_PAGE_SIZE);
        parts.push(part);
        start += count;
    }
    assert!(
        parts.len() <= 3,
        "split produced {} parts for a {} byte node",
        parts.len(),
        total
    );

    record_split();
    debug!(
        "btree: split node of {} bytes / {} keys into {} parts",
        total,
        nkeys,
        parts.len()
    );
    parts
}
