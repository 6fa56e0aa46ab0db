use std::fs;

use evosearch::config::IndexDir;
use evosearch::error::Error;
use evosearch::store::{ImageRecord, IndexState};
use rstest::*;
use tempfile::TempDir;

const DIM: usize = 4;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

fn record(path: &str, axis: usize) -> ImageRecord {
    ImageRecord { path: path.to_string(), embedding: unit(axis), mtime: 1.0, size: 10 }
}

#[rstest]
fn rows_stay_aligned_after_upsert_and_remove() {
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.upsert(record("/b.jpg", 1)).unwrap();
    state.upsert(record("/c.jpg", 2)).unwrap();
    assert_eq!(state.len(), 3);

    state.remove("/b.jpg").unwrap();
    assert_eq!(state.len(), 2);
    assert_eq!(state.paths(), &["/a.jpg".to_string(), "/c.jpg".to_string()]);

    // 删除后行号不残留，每一行仍然指向正确的图片
    let hits = state.query(&unit(2), 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].1.path, "/c.jpg");
    assert_eq!(hits[0].1.embedding, unit(2));
}

#[rstest]
fn upsert_replaces_existing_row() {
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.upsert(ImageRecord {
        path: "/a.jpg".to_string(),
        embedding: unit(3),
        mtime: 2.0,
        size: 20,
    })
    .unwrap();

    assert_eq!(state.len(), 1);
    let hits = state.query(&unit(3), 1).unwrap();
    assert_eq!(hits[0].1.mtime, 2.0);
    assert_eq!(hits[0].1.size, 20);
    assert!(hits[0].0 > 0.99);
}

#[rstest]
fn save_then_load_reproduces_records(temp_dir: TempDir) {
    let dir = IndexDir::new(temp_dir.path(), ".evosearch");
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.upsert(record("/b.jpg", 1)).unwrap();
    state.upsert(record("/c.jpg", 2)).unwrap();
    state.save(&dir).unwrap();

    let loaded = IndexState::load(&dir, DIM).unwrap();
    assert_eq!(loaded.len(), 3);
    for i in 0..3 {
        assert_eq!(loaded.record(i), state.record(i));
    }
}

#[rstest]
fn load_without_index_is_empty(temp_dir: TempDir) {
    let dir = IndexDir::new(temp_dir.path(), ".evosearch");
    let state = IndexState::load(&dir, DIM).unwrap();
    assert!(state.is_empty());
}

#[rstest]
fn query_clamps_to_available_count() {
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.upsert(record("/b.jpg", 1)).unwrap();

    let hits = state.query(&unit(0), 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].0 >= hits[1].0);
    assert_eq!(hits[0].1.path, "/a.jpg");
}

#[rstest]
fn equal_scores_keep_insertion_order() {
    let mut state = IndexState::new(DIM).unwrap();
    // 故意让字典序与插入顺序相反
    state.upsert(record("/z.jpg", 0)).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();

    let hits = state.query(&unit(0), 2).unwrap();
    assert_eq!(hits[0].0, hits[1].0);
    assert_eq!(hits[0].1.path, "/z.jpg");
    assert_eq!(hits[1].1.path, "/a.jpg");
}

#[rstest]
fn mismatched_files_are_corrupt(temp_dir: TempDir) {
    let dir = IndexDir::new(temp_dir.path(), ".evosearch");
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.upsert(record("/b.jpg", 1)).unwrap();
    state.save(&dir).unwrap();

    // 路径列表比向量索引少一行
    fs::write(dir.paths(), "[\"/a.jpg\"]").unwrap();

    assert!(matches!(IndexState::load(&dir, DIM), Err(Error::CorruptIndex(_))));

    // 损坏的索引整体弃用，不部分采信
    let state = IndexState::load_or_empty(&dir, DIM).unwrap();
    assert!(state.is_empty());
}

#[rstest]
fn unparseable_paths_are_corrupt(temp_dir: TempDir) {
    let dir = IndexDir::new(temp_dir.path(), ".evosearch");
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.save(&dir).unwrap();

    fs::write(dir.paths(), "not json").unwrap();
    assert!(matches!(IndexState::load(&dir, DIM), Err(Error::CorruptIndex(_))));
}

#[rstest]
fn save_leaves_no_temp_files(temp_dir: TempDir) {
    let dir = IndexDir::new(temp_dir.path(), ".evosearch");
    let mut state = IndexState::new(DIM).unwrap();
    state.upsert(record("/a.jpg", 0)).unwrap();
    state.save(&dir).unwrap();

    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
    assert!(dir.exists());
}
