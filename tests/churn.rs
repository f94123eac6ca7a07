use std::collections::HashMap;

use anyhow::Result;
use oorandom::Rand64;

use BirchDB::consts::{BNODE_LEAF, BTREE_PAGE_SIZE};
use BirchDB::{BNode, BTree, MemStore, PageStore};

/// Рандомизированный churn против эталонной HashMap: после каждого шага
/// дерево и модель согласованы по выборочным ключам, в конце — полная сверка
/// и возврат к одиночному листу без утечек страниц.
#[test]
fn random_churn_matches_model() -> Result<()> {
    let mut rng = Rand64::new(0xB1_5EED);
    let mut tree = BTree::new(MemStore::new())?;
    let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

    let key_space = 400u64;
    let ops = 6000;

    for step in 0..ops {
        let k = format!("key-{:06}", rng.rand_range(0..key_space));
        let key = k.into_bytes();
        match rng.rand_range(0..10) {
            // 60% вставка/обновление
            0..=5 => {
                let val = format!("v-{}-{}", step, rng.rand_u64()).into_bytes();
                tree.insert(&key, &val)?;
                model.insert(key, val);
            }
            // 30% удаление
            6..=8 => {
                let existed = tree.delete(&key)?;
                assert_eq!(existed, model.remove(&key).is_some(), "step {}", step);
            }
            // 10% чтение
            _ => {
                let got = tree.get(&key)?;
                assert_eq!(got.as_deref(), model.get(&key).map(|v| v.as_slice()));
            }
        }
    }

    // полная сверка модели
    for (key, val) in &model {
        assert_eq!(tree.get(key)?.as_deref(), Some(val.as_slice()));
    }

    // слить остаток и проверить отсутствие утечек
    let leftover: Vec<Vec<u8>> = model.keys().cloned().collect();
    for key in leftover {
        assert!(tree.delete(&key)?);
    }
    assert_eq!(tree.height()?, 1);
    assert_eq!(tree.store.allocated(), 1);
    Ok(())
}

/// Повторный прогон с тем же сидом обязан дать тот же корень: мутации
/// детерминированы, page id'ы арены монотонны.
#[test]
fn same_seed_same_root() -> Result<()> {
    let run = || -> Result<u64> {
        let mut rng = Rand64::new(42);
        let mut tree = BTree::new(MemStore::new())?;
        for _ in 0..1500 {
            let key = format!("key-{:05}", rng.rand_range(0..300));
            match rng.rand_range(0..3) {
                0 | 1 => tree.insert(key.as_bytes(), b"payload")?,
                _ => {
                    tree.delete(key.as_bytes())?;
                }
            }
        }
        Ok(tree.root())
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

/// Обход листьев слева направо после рандомизированного churn: сквозная
/// последовательность ключей строго возрастает и совпадает с отсортированной
/// моделью (сентинел с пустым ключом идёт первым).
#[test]
fn leaf_walk_yields_strictly_ascending_keys() -> Result<()> {
    let mut rng = Rand64::new(0xA5CE_17D);
    let mut tree = BTree::new(MemStore::new())?;
    let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

    for step in 0..4000u64 {
        let key = format!("key-{:06}", rng.rand_range(0..500)).into_bytes();
        if rng.rand_range(0..3) < 2 {
            let val = format!("v-{}", step).into_bytes();
            tree.insert(&key, &val)?;
            model.insert(key, val);
        } else {
            let existed = tree.delete(&key)?;
            assert_eq!(existed, model.remove(&key).is_some(), "step {}", step);
        }
    }

    let mut walked = Vec::new();
    collect_keys(&tree.store, tree.root(), &mut walked)?;

    assert_eq!(walked[0], b"", "sentinel must stay the minimum key");
    for w in walked.windows(2) {
        assert!(w[0] < w[1], "keys out of order: {:?} !< {:?}", w[0], w[1]);
    }

    let mut expected: Vec<Vec<u8>> = model.keys().cloned().collect();
    expected.sort();
    assert_eq!(&walked[1..], expected.as_slice());
    Ok(())
}

// ---------- helpers ----------

/// Рекурсивный in-order обход: у листа забрать ключи, у internal-узла
/// спуститься в детей слева направо.
fn collect_keys(store: &MemStore, pid: u64, out: &mut Vec<Vec<u8>>) -> Result<()> {
    let mut buf = vec![0u8; BTREE_PAGE_SIZE];
    store.read_page(pid, &mut buf)?;
    let node = BNode::from_page(&buf)?;
    if node.btype() == BNODE_LEAF {
        for i in 0..node.nkeys() {
            out.push(node.get_key(i).to_vec());
        }
    } else {
        for i in 0..node.nkeys() {
            collect_keys(store, node.get_ptr(i), out)?;
        }
    }
    Ok(())
}
