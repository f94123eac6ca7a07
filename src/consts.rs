//! Общие константы формата узлов B+tree.
//!
//! Один физический формат для обоих типов узлов (internal/leaf):
//!
//! [type u16][nkeys u16][pointers nkeys*u64][offsets nkeys*u16][KV-payload][unused]
//!
//! Каждая KV-запись: [klen u16][vlen u16][key][val]; у internal-узлов vlen=0.
//! Все целые — little-endian.

// -------- Страницы --------
pub const BTREE_PAGE_SIZE: usize = 4096;

/// Заголовок узла: [type u16][nkeys u16].
pub const HEADER: usize = 4;

// -------- Типы узлов --------
pub const BNODE_NODE: u16 = 1; // internal: ключи-разделители, без значений
pub const BNODE_LEAF: u16 = 2; // leaf: ключи со значениями

// -------- Лимиты KV --------
pub const BTREE_MAX_KEY_SIZE: usize = 1000;
pub const BTREE_MAX_VALUE_SIZE: usize = 3000;

/// Накладные расходы одной записи в KV-payload: [klen u16][vlen u16].
pub const KV_HDR: usize = 4;

/// Стоимость одной записи в списках узла: указатель (u64) + оффсет (u16).
pub const LIST_ITEM: usize = 8 + 2;

// Худший случай — узел с единственной максимальной записью — обязан помещаться
// в страницу. Это даёт верхнюю границу на размер key+value и гарантирует, что
// лист с одной записью никогда не потребует неразрешимого split'а.
const _: () = assert!(
    HEADER + LIST_ITEM + KV_HDR + BTREE_MAX_KEY_SIZE + BTREE_MAX_VALUE_SIZE <= BTREE_PAGE_SIZE
);
