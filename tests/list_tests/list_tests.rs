//! Tests for list operations and persistence

use atlasblock::config::BarrierPolicy;
use atlasblock::serializer::{I64Serializer, StringSerializer};
use atlasblock::{AtlasError, BlockBuffer, BufferedSerializer, Config, PersistentLinkedList};
use serde::{Deserialize, Serialize};

use super::*;

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_new_list_is_empty() {
    let (_temp, path) = setup_temp_file("list.dat");
    let list = open_strings(&path);

    assert_eq!(list.len(), 0);
    assert!(list.is_empty());
    assert!(list.iter().next().is_none());
    assert!(matches!(list.first(), Err(AtlasError::NoSuchElement)));
    assert!(matches!(list.last(), Err(AtlasError::NoSuchElement)));
    assert_eq!(list.block_buffer().block_count().unwrap(), 1);
}

#[test]
fn test_add_first_then_remove_first() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = open_strings(&path);

    list.add_first(&s("x")).unwrap();
    assert_eq!(list.remove_first().unwrap(), Some(s("x")));
    assert!(list.is_empty());
    assert!(matches!(list.remove_first(), Err(AtlasError::NoSuchElement)));
    assert!(matches!(list.remove_last(), Err(AtlasError::NoSuchElement)));
}

#[test]
fn test_add_first_and_add_last() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = open_strings(&path);

    list.add_first(&s("a")).unwrap();
    list.add_last(&s("b")).unwrap();

    assert_eq!(list.get(0).unwrap(), Some(s("a")));
    assert_eq!(list.get(1).unwrap(), Some(s("b")));
    assert_eq!(list.first().unwrap(), Some(s("a")));
    assert_eq!(list.last().unwrap(), Some(s("b")));
}

#[test]
fn test_abc_scenario_with_reopen() {
    let (_temp, path) = setup_temp_file("list.dat");

    {
        let mut list = open_strings(&path);
        list.add(&s("a")).unwrap();
        list.add(&s("b")).unwrap();
        list.add(&s("c")).unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1).unwrap(), Some(s("b")));
        assert_eq!(list.remove_first().unwrap(), Some(s("a")));
        assert_eq!(list.len(), 2);
        list.close().unwrap();
    }

    let list = open_strings(&path);
    assert_eq!(list.len(), 2);
    assert_eq!(strings(&list), vec![s("b"), s("c")]);
}

#[test]
fn test_reopen_preserves_order() {
    let (_temp, path) = setup_temp_file("numbers.dat");
    let config = config(&path);

    {
        let mut list = PersistentLinkedList::<i64, _>::open(&config).unwrap();
        for n in 0..500i64 {
            list.add_last(&(n * n)).unwrap();
        }
    }

    let list = PersistentLinkedList::<i64, _>::open(&config).unwrap();
    assert_eq!(list.len(), 500);
    let values: Vec<i64> = contents(&list).into_iter().map(|v| v.unwrap()).collect();
    let expected: Vec<i64> = (0..500).map(|n| n * n).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_fixed_serializer_uses_fixed_blocks() {
    let (_temp, path) = setup_temp_file("numbers.dat");
    let mut list = PersistentLinkedList::<i64, _>::open(&config(&path)).unwrap();

    for n in 0..10i64 {
        list.add(&n).unwrap();
    }

    // 24-byte node header + 8-byte payload + 1 status byte rounds to 64
    let blocks = list.into_block_buffer();
    assert_eq!(blocks.capacity() % 64, 0);
    assert_eq!(blocks.block_count().unwrap(), 11);
}

// =============================================================================
// Null Elements
// =============================================================================

#[test]
fn test_null_elements() {
    let (_temp, path) = setup_temp_file("list.dat");

    {
        let mut list = open_strings(&path);
        list.add(&s("a")).unwrap();
        list.add(None).unwrap();
        list.add_first(None).unwrap();

        assert_eq!(contents(&list), vec![None, Some(s("a")), None]);
        assert_eq!(list.index_of(None).unwrap(), Some(0));
        assert_eq!(list.last_index_of(None).unwrap(), Some(2));
        assert!(list.contains(None).unwrap());
    }

    let mut list = open_strings(&path);
    assert_eq!(contents(&list), vec![None, Some(s("a")), None]);
    assert_eq!(list.remove_last().unwrap(), None);
    assert_eq!(list.len(), 2);
}

#[test]
fn test_null_elements_in_fixed_list() {
    let (_temp, path) = setup_temp_file("numbers.dat");
    let mut list = PersistentLinkedList::<i64, _>::open(&config(&path)).unwrap();

    list.add(&1i64).unwrap();
    list.add(None).unwrap();
    list.add(&3i64).unwrap();

    assert_eq!(contents(&list), vec![Some(1), None, Some(3)]);
    assert_eq!(list.set(1, &2i64).unwrap(), None);
    assert_eq!(contents(&list), vec![Some(1), Some(2), Some(3)]);
}

// =============================================================================
// Index Operations
// =============================================================================

fn filled(path: &std::path::Path, values: &[&str]) -> StringList {
    let mut list = open_strings(path);
    for value in values {
        list.add(&s(value)).unwrap();
    }
    list
}

#[test]
fn test_get_walks_from_both_ends() {
    let (_temp, path) = setup_temp_file("list.dat");
    let names: Vec<String> = (0..25).map(|i| format!("item-{}", i)).collect();
    let mut list = open_strings(&path);
    for name in &names {
        list.add(name).unwrap();
    }

    for (index, name) in names.iter().enumerate() {
        assert_eq!(list.get(index as u64).unwrap().as_ref(), Some(name));
    }
    assert!(matches!(
        list.get(25),
        Err(AtlasError::IndexOutOfBounds { index: 25, len: 25 })
    ));
}

#[test]
fn test_insert() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = filled(&path, &["a", "c"]);

    list.insert(1, &s("b")).unwrap();
    list.insert(0, &s("start")).unwrap();
    list.insert(4, &s("end")).unwrap();

    assert_eq!(strings(&list), vec![s("start"), s("a"), s("b"), s("c"), s("end")]);
    assert!(matches!(
        list.insert(6, &s("x")),
        Err(AtlasError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn test_set_replaces_element() {
    let (_temp, path) = setup_temp_file("list.dat");

    {
        let mut list = filled(&path, &["a", "b", "c"]);
        let blocks_before = list.block_buffer().block_count().unwrap();

        assert_eq!(list.set(1, &s("a much longer replacement")).unwrap(), Some(s("b")));
        assert_eq!(list.set(0, None).unwrap(), Some(s("a")));
        assert_eq!(list.len(), 3);
        assert_eq!(list.block_buffer().block_count().unwrap(), blocks_before);
    }

    let list = open_strings(&path);
    assert_eq!(
        contents(&list),
        vec![None, Some(s("a much longer replacement")), Some(s("c"))]
    );
}

#[test]
fn test_remove_by_index() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = filled(&path, &["a", "b", "c", "d"]);

    assert_eq!(list.remove(2).unwrap(), Some(s("c")));
    assert_eq!(list.remove(0).unwrap(), Some(s("a")));
    assert_eq!(list.remove(1).unwrap(), Some(s("d")));
    assert_eq!(strings(&list), vec![s("b")]);
    assert!(matches!(list.remove(1), Err(AtlasError::IndexOutOfBounds { .. })));
}

#[test]
fn test_search() {
    let (_temp, path) = setup_temp_file("list.dat");
    let list = filled(&path, &["x", "y", "x", "z"]);

    assert_eq!(list.index_of(&s("x")).unwrap(), Some(0));
    assert_eq!(list.last_index_of(&s("x")).unwrap(), Some(2));
    assert_eq!(list.index_of(&s("z")).unwrap(), Some(3));
    assert_eq!(list.index_of(&s("w")).unwrap(), None);
    assert!(list.contains(&s("y")).unwrap());
    assert!(!list.contains(None).unwrap());
}

#[test]
fn test_remove_occurrences() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = filled(&path, &["x", "y", "x", "z", "x"]);

    assert!(list.remove_first_occurrence(&s("x")).unwrap());
    assert_eq!(strings(&list), vec![s("y"), s("x"), s("z"), s("x")]);

    assert!(list.remove_last_occurrence(&s("x")).unwrap());
    assert_eq!(strings(&list), vec![s("y"), s("x"), s("z")]);

    assert!(!list.remove_first_occurrence(&s("w")).unwrap());
    assert!(!list.remove_last_occurrence(None).unwrap());
    assert_eq!(list.len(), 3);
}

#[test]
fn test_clear() {
    let (_temp, path) = setup_temp_file("list.dat");

    {
        let mut list = filled(&path, &["a", "b", "c"]);
        list.clear().unwrap();
        assert!(list.is_empty());
        assert_eq!(list.block_buffer().block_count().unwrap(), 1);

        list.add(&s("after")).unwrap();
    }

    let list = open_strings(&path);
    assert_eq!(strings(&list), vec![s("after")]);
}

// =============================================================================
// Iteration
// =============================================================================

#[test]
fn test_iterate_both_directions() {
    let (_temp, path) = setup_temp_file("list.dat");
    let list = filled(&path, &["1", "2", "3", "4"]);

    let forward: Vec<String> = list.iter().map(|v| v.unwrap().unwrap()).collect();
    let backward: Vec<String> = list.iter().rev().map(|v| v.unwrap().unwrap()).collect();
    assert_eq!(forward, vec![s("1"), s("2"), s("3"), s("4")]);
    assert_eq!(backward, vec![s("4"), s("3"), s("2"), s("1")]);

    // Both ends meet in the middle without repeating
    let mut iter = list.iter();
    assert_eq!(iter.len(), 4);
    assert_eq!(iter.next().unwrap().unwrap(), Some(s("1")));
    assert_eq!(iter.next_back().unwrap().unwrap(), Some(s("4")));
    assert_eq!(iter.next().unwrap().unwrap(), Some(s("2")));
    assert_eq!(iter.next_back().unwrap().unwrap(), Some(s("3")));
    assert!(iter.next().is_none());
    assert!(iter.next_back().is_none());

    let mut count = 0;
    for value in &list {
        value.unwrap();
        count += 1;
    }
    assert_eq!(count, 4);
}

// =============================================================================
// Serializers & Policies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    id: u32,
    tags: Vec<String>,
}

#[test]
fn test_serde_elements() {
    let (_temp, path) = setup_temp_file("events.dat");
    let config = config(&path);
    let events: Vec<Event> = (0..20)
        .map(|id| Event {
            id,
            tags: (0..id).map(|t| format!("t{}", t)).collect(),
        })
        .collect();

    {
        let mut list =
            PersistentLinkedList::open_with_serializer(&config, BufferedSerializer::<Event>::new())
                .unwrap();
        for event in &events {
            list.add(event).unwrap();
        }
    }

    let list =
        PersistentLinkedList::open_with_serializer(&config, BufferedSerializer::<Event>::new())
            .unwrap();
    let stored: Vec<Event> = contents(&list).into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(stored, events);
    assert_eq!(list.index_of(&events[7]).unwrap(), Some(7));
}

#[test]
fn test_ordered_barrier_policy() {
    let (_temp, path) = setup_temp_file("list.dat");
    let config = Config::builder()
        .path(&path)
        .barrier_policy(BarrierPolicy::Ordered)
        .build();

    {
        let mut list = PersistentLinkedList::<String, _>::open(&config).unwrap();
        list.add(&s("fast")).unwrap();
        list.add(&s("path")).unwrap();
        list.remove_first().unwrap();
    }

    let list = PersistentLinkedList::<String, _>::open(&config).unwrap();
    assert_eq!(strings(&list), vec![s("path")]);
}

#[test]
fn test_read_only_reopen() {
    let (_temp, path) = setup_temp_file("list.dat");
    drop(filled(&path, &["a", "b"]));

    let config = Config::builder().path(&path).read_only(true).build();
    let mut list = PersistentLinkedList::<String, _>::open(&config).unwrap();
    assert_eq!(strings(&list), vec![s("a"), s("b")]);
    assert!(matches!(list.add(&s("c")), Err(AtlasError::ReadOnly)));
    assert_eq!(list.len(), 2);
}

#[test]
fn test_shared_list_across_threads() {
    let (_temp, path) = setup_temp_file("numbers.dat");
    let shared = PersistentLinkedList::<i64, _>::open(&config(&path))
        .unwrap()
        .into_shared();

    let handles: Vec<_> = (0..4i64)
        .map(|t| {
            let shared = std::sync::Arc::clone(&shared);
            std::thread::spawn(move || {
                for n in 0..25i64 {
                    shared.lock().add(&(t * 100 + n)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let list = shared.lock();
    assert_eq!(list.len(), 100);
    let mut values: Vec<i64> = contents(&*list).into_iter().map(|v| v.unwrap()).collect();
    values.sort();
    let mut expected: Vec<i64> = (0..4).flat_map(|t| (0..25).map(move |n| t * 100 + n)).collect();
    expected.sort();
    assert_eq!(values, expected);
}

// =============================================================================
// Open-Time Validation
// =============================================================================

fn reopen(blocks: Box<dyn BlockBuffer + Send>) -> atlasblock::Result<StringList> {
    PersistentLinkedList::with_block_buffer(blocks, StringSerializer, BarrierPolicy::Durable)
}

#[test]
fn test_bad_magic_is_format_error() {
    let (_temp, path) = setup_temp_file("list.dat");

    let mut blocks = PersistentLinkedList::<String, _>::open(&config(&path))
        .unwrap()
        .into_block_buffer();
    blocks.put(0, 0, b"NOPE").unwrap();

    let result = reopen(blocks);
    assert!(matches!(result, Err(AtlasError::Format(_))));
}

#[test]
fn test_bad_version_is_format_error() {
    let (_temp, path) = setup_temp_file("list.dat");

    let mut blocks = PersistentLinkedList::<String, _>::open(&config(&path))
        .unwrap()
        .into_block_buffer();
    blocks.put_i32(0, 4, 2).unwrap();

    let result = reopen(blocks);
    assert!(matches!(result, Err(AtlasError::Format(_))));
}

#[test]
fn test_dangling_head_is_corruption() {
    let (_temp, path) = setup_temp_file("list.dat");

    let list = filled(&path, &["a"]);
    let meta = list.meta_block();
    let mut blocks = list.into_block_buffer();
    blocks.put_i64(meta, 8, 1 << 20).unwrap();

    let result = reopen(blocks);
    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}

#[test]
fn test_cycle_is_corruption() {
    let (_temp, path) = setup_temp_file("list.dat");

    let list = filled(&path, &["a", "b"]);
    let meta = list.meta_block();
    let mut blocks = list.into_block_buffer();
    let head = blocks.get_i64(meta, 8).unwrap();
    let tail = blocks.get_i64(meta, 16).unwrap();

    // tail.next -> head and head.prev -> tail closes the loop
    blocks.put_i64(tail as u64, 0, head).unwrap();
    blocks.put_i64(head as u64, 8, tail).unwrap();

    let result = reopen(blocks);
    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}

#[test]
fn test_wrong_tail_is_corruption() {
    let (_temp, path) = setup_temp_file("list.dat");

    let list = filled(&path, &["a", "b"]);
    let meta = list.meta_block();
    let mut blocks = list.into_block_buffer();
    let head = blocks.get_i64(meta, 8).unwrap();
    blocks.put_i64(meta, 16, head).unwrap();

    let result = reopen(blocks);
    assert!(matches!(result, Err(AtlasError::Corruption(_))));
}

#[test]
fn test_closed_list_rejects_operations() {
    let (_temp, path) = setup_temp_file("list.dat");
    let mut list = filled(&path, &["a"]);

    list.close().unwrap();
    assert!(matches!(list.get(0), Err(AtlasError::Closed)));
    assert!(matches!(list.add(&s("b")), Err(AtlasError::Closed)));
}

#[test]
fn test_i64_serializer_explicit() {
    let (_temp, path) = setup_temp_file("numbers.dat");
    let mut list = PersistentLinkedList::<i64, _>::open_with_serializer(&config(&path), I64Serializer).unwrap();

    list.add(&-7i64).unwrap();
    assert_eq!(list.first().unwrap(), Some(-7));
}
