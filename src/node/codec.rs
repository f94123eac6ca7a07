//! Кодек узла: байтовые аксессоры поверх буфера одной страницы.
//!
//! Раскладка (обе разновидности узла используют один формат):
//!   [type u16][nkeys u16][ptrs nkeys*8B][offsets nkeys*2B][KV payload]
//!
//! offsets[i] — накопленная длина payload ПОСЛЕ записи i (конец записи i
//! относительно начала payload); offset(0) == 0 по договорённости и не
//! хранится в слоте 0 — слот i держит конец записи i-1. Благодаря этому
//! kv_pos(idx) находит запись без сканирования.
//!
//! Запись payload: [klen u16][vlen u16][key][val]; у internal-узлов vlen = 0.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    BNODE_LEAF, BNODE_NODE, BTREE_PAGE_SIZE, HEADER, KV_HDR, LIST_ITEM,
};

/// Узел B+tree: владеющий байтовый буфер + аксессоры.
///
/// Scratch-узлы берут двойной размер страницы: результат мутации может
/// временно превысить страницу на одну запись, split приводит его в норму
/// до публикации.
pub struct BNode {
    pub(crate) data: Vec<u8>,
}

impl BNode {
    /// Пустой рабочий буфер под сборку нового узла.
    pub fn scratch() -> Self {
        BNode {
            data: vec![0u8; 2 * BTREE_PAGE_SIZE],
        }
    }

    /// Декодировать страницу, прочитанную из хранилища.
    ///
    /// Байты недоверенные (диск/внешний коллаборатор), поэтому раскладка
    /// проверяется: тег типа, границы длин, строгий рост оффсетов.
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        let node = BNode { data: buf.to_vec() };
        node.validate()?;
        Ok(node)
    }

    fn validate(&self) -> Result<()> {
        if self.data.len() < HEADER {
            return Err(anyhow!("node buffer too small: {} bytes", self.data.len()));
        }
        let btype = self.btype();
        if btype != BNODE_NODE && btype != BNODE_LEAF {
            return Err(anyhow!("bad node type tag: {}", btype));
        }
        let n = self.nkeys();
        if self.data.len() < HEADER + LIST_ITEM * n {
            return Err(anyhow!(
                "node truncated: {} entries do not fit in {} bytes",
                n,
                self.data.len()
            ));
        }
        // строгий рост: каждая запись занимает минимум KV_HDR байт
        for i in 1..=n {
            if self.get_offset(i) <= self.get_offset(i - 1) {
                return Err(anyhow!("node offsets not increasing at entry {}", i));
            }
        }
        if self.data.len() < self.kv_pos(n) {
            return Err(anyhow!(
                "node payload truncated: need {} bytes, have {}",
                self.kv_pos(n),
                self.data.len()
            ));
        }
        Ok(())
    }

    pub fn btype(&self) -> u16 {
        LittleEndian::read_u16(&self.data[0..2])
    }

    pub fn nkeys(&self) -> usize {
        LittleEndian::read_u16(&self.data[2..4]) as usize
    }

    pub fn set_header(&mut self, btype: u16, nkeys: usize) {
        LittleEndian::write_u16(&mut self.data[0..2], btype);
        LittleEndian::write_u16(&mut self.data[2..4], nkeys as u16);
    }

    /// Указатель на ребёнка idx. У листьев слот существует (общая раскладка),
    /// но содержимое не несёт смысла.
    pub fn get_ptr(&self, idx: usize) -> u64 {
        assert!(idx < self.nkeys(), "ptr index {} out of {}", idx, self.nkeys());
        let pos = HEADER + 8 * idx;
        LittleEndian::read_u64(&self.data[pos..pos + 8])
    }

    pub fn set_ptr(&mut self, idx: usize, ptr: u64) {
        assert!(idx < self.nkeys(), "ptr index {} out of {}", idx, self.nkeys());
        let pos = HEADER + 8 * idx;
        LittleEndian::write_u64(&mut self.data[pos..pos + 8], ptr);
    }

    fn offset_slot(&self, idx: usize) -> usize {
        // слот idx хранит конец записи idx-1; idx==0 не имеет слота
        HEADER + 8 * self.nkeys() + 2 * (idx - 1)
    }

    /// Конец записи idx-1 относительно начала payload; get_offset(0) == 0
    /// без чтения памяти.
    pub fn get_offset(&self, idx: usize) -> usize {
        if idx == 0 {
            return 0;
        }
        assert!(idx <= self.nkeys(), "offset index {} out of {}", idx, self.nkeys());
        let pos = self.offset_slot(idx);
        LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize
    }

    /// Записать накопленную длину payload после записи idx-1.
    /// set_offset(0, _) — no-op по той же договорённости.
    pub fn set_offset(&mut self, idx: usize, offset: usize) {
        if idx == 0 {
            return;
        }
        assert!(idx <= self.nkeys(), "offset index {} out of {}", idx, self.nkeys());
        let pos = self.offset_slot(idx);
        LittleEndian::write_u16(&mut self.data[pos..pos + 2], offset as u16);
    }

    /// Абсолютная позиция записи idx в буфере; kv_pos(nkeys()) == nbytes().
    pub fn kv_pos(&self, idx: usize) -> usize {
        assert!(idx <= self.nkeys(), "kv index {} out of {}", idx, self.nkeys());
        HEADER + LIST_ITEM * self.nkeys() + self.get_offset(idx)
    }

    pub fn get_key(&self, idx: usize) -> &[u8] {
        assert!(idx < self.nkeys(), "kv index {} out of {}", idx, self.nkeys());
        let pos = self.kv_pos(idx);
        let klen = LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize;
        &self.data[pos + KV_HDR..pos + KV_HDR + klen]
    }

    pub fn get_val(&self, idx: usize) -> &[u8] {
        assert!(idx < self.nkeys(), "kv index {} out of {}", idx, self.nkeys());
        let pos = self.kv_pos(idx);
        let klen = LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize;
        let vlen = LittleEndian::read_u16(&self.data[pos + 2..pos + 4]) as usize;
        &self.data[pos + KV_HDR + klen..pos + KV_HDR + klen + vlen]
    }

    /// Итоговый закодированный размер узла.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    /// Живой префикс буфера — ровно то, что публикуется в страницу.
    pub fn as_page(&self) -> &[u8] {
        &self.data[..self.nbytes()]
    }

    /// Полная стоимость записи idx: строка списков (ptr+offset) + запись.
    pub(crate) fn entry_cost(&self, idx: usize) -> usize {
        LIST_ITEM + (self.kv_pos(idx + 1) - self.kv_pos(idx))
    }
}

/// Наибольший индекс i, для которого get_key(i) <= key; 0, если ни один
/// из хранимых ключей не подходит.
///
/// Первый ключ узла — нижняя граница его поддерева (в корневом листе это
/// сентинел с пустым ключом), поэтому скан стартует с индекса 1: слот 0
/// подходит всегда.
pub fn lookup_le(node: &BNode, key: &[u8]) -> usize {
    let mut found = 0;
    for i in 1..node.nkeys() {
        match node.get_key(i).cmp(key) {
            Ordering::Less => found = i,
            Ordering::Equal => return i,
            Ordering::Greater => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::node_append_kv;

    fn leaf3() -> BNode {
        let mut n = BNode::scratch();
        n.set_header(BNODE_LEAF, 3);
        node_append_kv(&mut n, 0, 0, b"", b"");
        node_append_kv(&mut n, 1, 0, b"alpha", b"1");
        node_append_kv(&mut n, 2, 0, b"beta", b"22");
        n
    }

    #[test]
    fn header_roundtrip() {
        let mut n = BNode::scratch();
        n.set_header(BNODE_NODE, 7);
        assert_eq!(n.btype(), BNODE_NODE);
        assert_eq!(n.nkeys(), 7);
    }

    #[test]
    fn offsets_are_cumulative_entry_ends() {
        let n = leaf3();
        assert_eq!(n.get_offset(0), 0);
        assert_eq!(n.get_offset(1), KV_HDR); // сентинел: пустые key и val
        assert_eq!(n.get_offset(2), 2 * KV_HDR + 5 + 1);
        assert_eq!(n.get_offset(3), 3 * KV_HDR + 5 + 1 + 4 + 2);
        assert_eq!(n.nbytes(), HEADER + 3 * LIST_ITEM + n.get_offset(3));
    }

    #[test]
    fn kv_slices() {
        let n = leaf3();
        assert_eq!(n.get_key(0), b"");
        assert_eq!(n.get_key(1), b"alpha");
        assert_eq!(n.get_val(1), b"1");
        assert_eq!(n.get_key(2), b"beta");
        assert_eq!(n.get_val(2), b"22");
    }

    #[test]
    fn lookup_le_picks_last_not_greater() {
        let n = leaf3();
        assert_eq!(lookup_le(&n, b"aaaa"), 0);
        assert_eq!(lookup_le(&n, b"alpha"), 1);
        assert_eq!(lookup_le(&n, b"azzz"), 1);
        assert_eq!(lookup_le(&n, b"beta"), 2);
        assert_eq!(lookup_le(&n, b"zzz"), 2);
    }

    #[test]
    fn from_page_rejects_garbage() {
        assert!(BNode::from_page(&[0u8; 2]).is_err());

        let mut bad_type = vec![0u8; BTREE_PAGE_SIZE];
        bad_type[0] = 9;
        assert!(BNode::from_page(&bad_type).is_err());

        // nkeys велик, payload не помещается
        let mut truncated = vec![0u8; HEADER + 4];
        truncated[0] = BNODE_LEAF as u8;
        truncated[2] = 200;
        assert!(BNode::from_page(&truncated).is_err());
    }

    #[test]
    fn from_page_accepts_valid_leaf() {
        let n = leaf3();
        let decoded = BNode::from_page(n.as_page()).unwrap();
        assert_eq!(decoded.nkeys(), 3);
        assert_eq!(decoded.get_key(2), b"beta");
    }
}
