#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod metrics;

// Модульная раскладка (папки с mod.rs)
pub mod node;  // src/node/{mod,codec,build,leaf}.rs
pub mod store; // src/store/mod.rs
pub mod tree;  // src/tree/{mod,insert,delete}.rs

// Удобные реэкспорты
pub use node::BNode;
pub use store::{MemStore, PageStore};
pub use tree::BTree;
