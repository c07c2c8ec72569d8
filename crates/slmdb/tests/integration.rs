//! End-to-end tests against the public `Database` API: no internal module is reached into here,
//! only what a real embedder would call.

use std::sync::Arc;
use std::thread;

use slmdb::{Database, Options, ReadOptions, WriteOptions};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Database {
    let options = Options { create_if_missing: true, ..Options::default() };
    Database::open(dir, options).expect("database should open")
}

#[test]
fn put_and_get_round_trip() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    db.put(&WriteOptions::default(), b"k1", b"v1").unwrap();
    db.put(&WriteOptions::default(), b"k2", b"v2").unwrap();

    assert_eq!(db.get(&ReadOptions::default(), b"k1").unwrap(), b"v1");
    assert_eq!(db.get(&ReadOptions::default(), b"k2").unwrap(), b"v2");
    assert!(db.get(&ReadOptions::default(), b"k3").unwrap_err().is_not_found());
}

#[test]
fn delete_then_get_returns_not_found() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    db.put(&WriteOptions::default(), b"k", b"v").unwrap();
    assert!(db.contains(&ReadOptions::default(), b"k").unwrap());

    db.delete(&WriteOptions::default(), b"k").unwrap();
    assert!(db.get(&ReadOptions::default(), b"k").unwrap_err().is_not_found());
    assert!(!db.contains(&ReadOptions::default(), b"k").unwrap());
}

#[test]
fn overwrite_delete_overwrite_settles_on_last_write() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    db.put(&WriteOptions::default(), b"k", b"a").unwrap();
    db.put(&WriteOptions::default(), b"k", b"b").unwrap();
    db.delete(&WriteOptions::default(), b"k").unwrap();
    db.put(&WriteOptions::default(), b"k", b"c").unwrap();

    assert_eq!(db.get(&ReadOptions::default(), b"k").unwrap(), b"c");

    // Force a flush and a full compaction; the final value must survive both.
    db.flush().unwrap();
    db.compact_range();
    assert_eq!(db.get(&ReadOptions::default(), b"k").unwrap(), b"c");
}

#[test]
fn update_fails_on_absent_key_but_succeeds_once_present() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let err = db.update(&WriteOptions::default(), b"k", b"v").unwrap_err();
    assert!(err.is_not_found());

    db.put(&WriteOptions::default(), b"k", b"v1").unwrap();
    db.update(&WriteOptions::default(), b"k", b"v2").unwrap();
    assert_eq!(db.get(&ReadOptions::default(), b"k").unwrap(), b"v2");
}

#[test]
fn write_batch_is_atomic_across_entries() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    db.put(&WriteOptions::default(), b"stays", b"v0").unwrap();

    let mut batch = slmdb::WriteBatch::new();
    batch.put(b"new", b"v1");
    batch.delete(b"stays");
    db.write(&WriteOptions::default(), &batch).unwrap();

    assert_eq!(db.get(&ReadOptions::default(), b"new").unwrap(), b"v1");
    assert!(db.get(&ReadOptions::default(), b"stays").unwrap_err().is_not_found());
}

#[test]
fn snapshot_is_unaffected_by_later_writes() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    db.put(&WriteOptions::default(), b"k", b"v1").unwrap();
    let snapshot = db.get_snapshot();
    db.put(&WriteOptions::default(), b"k", b"v2").unwrap();

    let snapshot_read = ReadOptions { snapshot: Some(snapshot), ..ReadOptions::default() };
    assert_eq!(db.get(&snapshot_read, b"k").unwrap(), b"v1");
    assert_eq!(db.get(&ReadOptions::default(), b"k").unwrap(), b"v2");
}

#[test]
fn many_keys_flush_and_compact_then_iterate_in_order() {
    let dir = tempdir().unwrap();
    let options = Options {
        create_if_missing: true,
        write_buffer_size: 4 * 1024,
        ..Options::default()
    };
    let db = Database::open(dir.path(), options).unwrap();

    const COUNT: usize = 2_000;
    for i in 0..COUNT {
        let key = format!("key{i:06}");
        let value = format!("v{i}");
        db.put(&WriteOptions::default(), key.as_bytes(), value.as_bytes()).unwrap();
    }
    db.flush().unwrap();
    db.compact_range();

    let mut iter = db.new_iterator(&ReadOptions::default()).unwrap();
    iter.seek_to_first();
    let mut seen = 0usize;
    let mut previous: Option<Vec<u8>> = None;
    while iter.valid() {
        let key = iter.key().unwrap().to_vec();
        if let Some(prev) = &previous {
            assert!(prev.as_slice() < key.as_slice(), "iterator must yield keys in ascending order");
        }
        let expected_index: usize = std::str::from_utf8(&key[3..]).unwrap().parse().unwrap();
        assert_eq!(iter.value().unwrap(), format!("v{expected_index}").as_bytes());
        previous = Some(key);
        seen += 1;
        iter.next();
    }
    assert_eq!(seen, COUNT);
}

#[test]
fn deleting_odd_keys_then_compacting_keeps_only_even_keys() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    const COUNT: usize = 1_000;
    for i in 0..COUNT {
        let key = format!("k{i:04}");
        db.put(&WriteOptions::default(), key.as_bytes(), b"v").unwrap();
    }
    for i in (1..COUNT).step_by(2) {
        let key = format!("k{i:04}");
        db.delete(&WriteOptions::default(), key.as_bytes()).unwrap();
    }
    db.flush().unwrap();
    db.compact_range();

    for i in 0..COUNT {
        let key = format!("k{i:04}");
        let result = db.contains(&ReadOptions::default(), key.as_bytes()).unwrap();
        assert_eq!(result, i % 2 == 0, "key {key} had unexpected liveness after compaction");
    }
}

#[test]
fn seek_positions_at_first_key_greater_or_equal() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    for key in ["a", "c", "e", "g"] {
        db.put(&WriteOptions::default(), key.as_bytes(), b"v").unwrap();
    }

    let mut iter = db.new_iterator(&ReadOptions::default()).unwrap();
    iter.seek(b"d");
    assert!(iter.valid());
    assert_eq!(iter.key().unwrap(), b"e");

    iter.seek(b"z");
    assert!(!iter.valid());
}

#[test]
fn reopening_after_drop_recovers_every_write() {
    let dir = tempdir().unwrap();
    {
        let db = open(dir.path());
        for i in 0..500 {
            let key = format!("k{i}");
            db.put(&WriteOptions { sync: true }, key.as_bytes(), b"v").unwrap();
        }
        // Dropped without an explicit close; recovery must replay the write-ahead log.
    }

    let db = open(dir.path());
    for i in 0..500 {
        let key = format!("k{i}");
        assert_eq!(db.get(&ReadOptions::default(), key.as_bytes()).unwrap(), b"v");
    }
}

#[test]
fn second_open_of_same_directory_is_rejected_while_first_is_live() {
    let dir = tempdir().unwrap();
    let _db = open(dir.path());

    let options = Options { create_if_missing: true, ..Options::default() };
    let second = Database::open(dir.path(), options);
    assert!(second.is_err(), "a second concurrent open of the same directory should fail");
}

#[test]
fn get_property_reports_file_population_after_a_flush() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    for i in 0..50 {
        db.put(&WriteOptions::default(), format!("k{i}").as_bytes(), b"v").unwrap();
    }
    db.flush().unwrap();

    let stats = db.get_property("stats").expect("stats is a recognized property");
    assert!(stats.contains("files: 1"));

    let sstables = db.get_property("sstables").expect("sstables is a recognized property");
    assert!(sstables.contains("{50 / 50}"));

    assert!(db.get_property("csv").unwrap().contains("file_number,file_size,alive,total"));
    assert!(db.get_property("nonexistent-property").is_none());
}

#[test]
fn wait_for_compaction_returns_once_a_requested_pass_settles() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    for i in 0..200 {
        db.put(&WriteOptions::default(), format!("k{i}").as_bytes(), b"v").unwrap();
    }
    db.flush().unwrap();
    for i in (0..200).step_by(2) {
        db.delete(&WriteOptions::default(), format!("k{i}").as_bytes()).unwrap();
    }
    db.flush().unwrap();
    db.wait_for_compaction();
    // No assertion on the resulting file count: density-eligibility depends on the merge
    // threshold, not on this test. The call itself must simply return rather than hang.
}

#[test]
fn destroy_database_removes_every_file_so_the_directory_reopens_empty() {
    let dir = tempdir().unwrap();
    {
        let db = open(dir.path());
        db.put(&WriteOptions::default(), b"k", b"v").unwrap();
        db.flush().unwrap();
    }

    slmdb::destroy_database(dir.path()).unwrap();

    let db = open(dir.path());
    assert!(db.get(&ReadOptions::default(), b"k").unwrap_err().is_not_found());
}

#[test]
fn concurrent_writer_and_reader_never_see_a_stale_overwrite() {
    let dir = tempdir().unwrap();
    let db = Arc::new(open(dir.path()));

    const COUNT: u64 = 20_000;
    let writer_db = Arc::clone(&db);
    let writer = thread::spawn(move || {
        for i in 0..COUNT {
            let key = format!("k{i}");
            writer_db.put(&WriteOptions::default(), key.as_bytes(), i.to_string().as_bytes()).unwrap();
        }
    });

    let reader_db = Arc::clone(&db);
    let reader = thread::spawn(move || {
        for i in 0..COUNT {
            let key = format!("k{i}");
            match reader_db.get(&ReadOptions::default(), key.as_bytes()) {
                Ok(value) => {
                    let seen: u64 = std::str::from_utf8(&value).unwrap().parse().unwrap();
                    assert_eq!(seen, i, "a get for an already-written key must never return a stale value");
                }
                Err(err) => assert!(err.is_not_found()),
            }
        }
    });

    writer.join().unwrap();
    reader.join().unwrap();
}
