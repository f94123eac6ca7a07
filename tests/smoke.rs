use anyhow::Result;

use BirchDB::{BTree, MemStore, PageStore};

#[test]
fn smoke_insert_get_delete() -> Result<()> {
    let mut tree = BTree::new(MemStore::new())?;

    // 1) вставка трёх ключей
    tree.insert(b"a", b"1")?;
    tree.insert(b"b", b"2")?;
    tree.insert(b"c", b"3")?;

    // 2) точечный поиск
    assert_eq!(tree.get(b"a")?.as_deref(), Some(b"1".as_slice()));
    assert_eq!(tree.get(b"b")?.as_deref(), Some(b"2".as_slice()));
    assert_eq!(tree.get(b"c")?.as_deref(), Some(b"3".as_slice()));

    // 3) промах
    assert!(tree.get(b"nope")?.is_none());

    // 4) last-write-wins
    tree.insert(b"b", b"two")?;
    assert_eq!(tree.get(b"b")?.as_deref(), Some(b"two".as_slice()));
    tree.update(b"b", b"TWO")?;
    assert_eq!(tree.get(b"b")?.as_deref(), Some(b"TWO".as_slice()));

    // 5) удаление и идемпотентный повтор
    assert!(tree.delete(b"b")?);
    assert!(tree.get(b"b")?.is_none());
    let root_before = tree.root();
    assert!(!tree.delete(b"b")?);
    assert_eq!(tree.root(), root_before, "no-op delete must not republish pages");

    // остальные ключи не задеты
    assert_eq!(tree.get(b"a")?.as_deref(), Some(b"1".as_slice()));
    assert_eq!(tree.get(b"c")?.as_deref(), Some(b"3".as_slice()));
    Ok(())
}

#[test]
fn key_and_value_limits() -> Result<()> {
    let mut tree = BTree::new(MemStore::new())?;

    // пустой ключ зарезервирован под сентинел
    assert!(tree.insert(b"", b"v").is_err());
    assert!(tree.get(b"")?.is_none());
    assert!(!tree.delete(b"")?);

    // граничные размеры проходят
    let max_key = vec![b'k'; 1000];
    let max_val = vec![b'v'; 3000];
    tree.insert(&max_key, &max_val)?;
    assert_eq!(tree.get(&max_key)?.as_deref(), Some(max_val.as_slice()));

    // превышение — ошибка, дерево не тронуто
    let root_before = tree.root();
    assert!(tree.insert(&vec![b'k'; 1001], b"v").is_err());
    assert!(tree.insert(b"k", &vec![b'v'; 3001]).is_err());
    assert_eq!(tree.root(), root_before);

    // сверхдлинный ключ на чтении/удалении — просто промах
    assert!(tree.get(&vec![b'k'; 1001])?.is_none());
    assert!(!tree.delete(&vec![b'k'; 1001])?);
    Ok(())
}

#[test]
fn fresh_tree_is_single_leaf_page() -> Result<()> {
    let tree = BTree::new(MemStore::new())?;
    assert_eq!(tree.height()?, 1);
    assert_eq!(tree.store.allocated(), 1);
    Ok(())
}

#[test]
fn open_resumes_from_published_root() -> Result<()> {
    let mut tree = BTree::new(MemStore::new())?;
    tree.insert(b"k1", b"v1")?;
    tree.insert(b"k2", b"v2")?;
    let root = tree.root();
    let store = tree.store;

    let reopened = BTree::open(store, root)?;
    assert_eq!(reopened.root(), root);
    assert_eq!(reopened.get(b"k1")?.as_deref(), Some(b"v1".as_slice()));
    assert_eq!(reopened.get(b"k2")?.as_deref(), Some(b"v2".as_slice()));
    Ok(())
}

#[test]
fn open_rejects_garbage_root() {
    let mut store = MemStore::new();
    let pid = store.alloc_page(&[0xFFu8; 64]).expect("alloc");
    assert!(BTree::open(store, pid).is_err());
}
