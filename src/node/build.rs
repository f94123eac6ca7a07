//! Примитивы сборки узла: append одной записи и копирование диапазона.
//!
//! Оба примитива заполняют узел строго слева направо: append в позицию idx
//! опирается на уже записанный offset(idx). Все операции листа/internal в
//! leaf.rs и tree/ выражаются через эти две функции.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::KV_HDR;
use crate::node::BNode;

/// Дописать запись (ptr, key, val) в позицию idx и продвинуть offset(idx+1).
/// Для листьев ptr передаётся нулём (слот физически существует в обеих
/// разновидностях узла).
pub fn node_append_kv(dst: &mut BNode, idx: usize, ptr: u64, key: &[u8], val: &[u8]) {
    dst.set_ptr(idx, ptr);
    let pos = dst.kv_pos(idx);
    LittleEndian::write_u16(&mut dst.data[pos..pos + 2], key.len() as u16);
    LittleEndian::write_u16(&mut dst.data[pos + 2..pos + 4], val.len() as u16);
    dst.data[pos + KV_HDR..pos + KV_HDR + key.len()].copy_from_slice(key);
    dst.data[pos + KV_HDR + key.len()..pos + KV_HDR + key.len() + val.len()]
        .copy_from_slice(val);
    let end = dst.get_offset(idx) + KV_HDR + key.len() + val.len();
    dst.set_offset(idx + 1, end);
}

/// Скопировать n записей src[src_start..] в dst[dst_start..]: указатели и
/// оффсеты поштучно (оффсеты пересчитываются относительно начала диапазона),
/// payload — одним memcpy.
pub fn node_append_range(
    dst: &mut BNode,
    src: &BNode,
    dst_start: usize,
    src_start: usize,
    n: usize,
) {
    assert!(src_start + n <= src.nkeys(), "src range out of bounds");
    assert!(dst_start + n <= dst.nkeys(), "dst range out of bounds");
    if n == 0 {
        return;
    }
    for i in 0..n {
        dst.set_ptr(dst_start + i, src.get_ptr(src_start + i));
    }
    let dst_base = dst.get_offset(dst_start);
    let src_base = src.get_offset(src_start);
    for i in 1..=n {
        let off = dst_base + src.get_offset(src_start + i) - src_base;
        dst.set_offset(dst_start + i, off);
    }
    let d0 = dst.kv_pos(dst_start);
    let d1 = dst.kv_pos(dst_start + n);
    let s0 = src.kv_pos(src_start);
    let s1 = src.kv_pos(src_start + n);
    debug_assert_eq!(d1 - d0, s1 - s0);
    dst.data[d0..d1].copy_from_slice(&src.data[s0..s1]);
}
