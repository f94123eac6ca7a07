//! node — кодек страницы и алгоритмы в пределах одного узла.
//!
//! Что внутри:
//! - codec: BNode + байтовые аксессоры (header, указатели, оффсеты, KV) и
//!   поиск lookup_le;
//! - build: примитивы сборки (append одной записи, копирование диапазона);
//! - leaf: insert/update/delete одной записи листа (copy-on-write).
//!
//! Ничего выше одного узла здесь нет: split/merge и рекурсия — в tree.

mod build;
mod codec;
mod leaf;

pub use build::{node_append_kv, node_append_range};
pub use codec::{lookup_le, BNode};
pub use leaf::{leaf_delete, leaf_insert, leaf_update};
