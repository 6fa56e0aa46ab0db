mod common;

use std::fs;
use std::thread::sleep;
use std::time::Duration;

use common::StubEmbedder;
use evosearch::config::{EmbedOptions, StorageOptions};
use evosearch::embed::ModelVariant;
use evosearch::error::Error;
use evosearch::indexer::{SortMode, index_folder, search_by_image, search_by_text};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn embed_opts() -> EmbedOptions {
    EmbedOptions { model: ModelVariant::ClipVitB32, batch_size: 2 }
}

fn storage_opts() -> StorageOptions {
    StorageOptions {
        index_folder: ".evosearch".to_string(),
        suffix: "jpg,jpeg,png,bmp,webp".to_string(),
    }
}

#[rstest]
fn add_modify_delete_scenario(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("A.jpg"), "cat on a sofa").unwrap();
    fs::write(folder.join("B.png"), "red car").unwrap();
    fs::write(folder.join("C.bmp"), "mountain lake").unwrap();

    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 3);
    assert_eq!(report.updated, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.total_indexed, 3);

    // 无变化时重复索引不产生任何改动
    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.total_indexed, 3);

    // 内容变化（大小不同）触发重嵌入
    fs::write(folder.join("A.jpg"), "cat on a sofa, closer").unwrap();
    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 0);

    // 磁盘上删除的文件在下一次索引时被移除
    fs::remove_file(folder.join("B.png")).unwrap();
    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.total_indexed, 2);

    let hits =
        search_by_text(&StubEmbedder, folder, "red car", 5, SortMode::Similarity, &storage_opts())
            .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.filename != "B.png"));
}

#[rstest]
fn skips_unsupported_and_nested_files(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("a.jpg"), "one").unwrap();
    fs::write(folder.join("notes.txt"), "two").unwrap();
    fs::create_dir(folder.join("sub")).unwrap();
    fs::write(folder.join("sub").join("b.jpg"), "three").unwrap();

    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.total_indexed, 1);
}

#[rstest]
fn extension_match_is_case_insensitive(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("a.JPG"), "one").unwrap();
    fs::write(folder.join("b.WebP"), "two").unwrap();

    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 2);
}

#[rstest]
fn unreadable_image_is_skipped_not_fatal(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("a.jpg"), "fine").unwrap();
    fs::write(folder.join("bad.jpg"), "broken bytes").unwrap();
    fs::write(folder.join("c.jpg"), "also fine").unwrap();

    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(report.skipped_errors, 1);
    assert_eq!(report.total_indexed, 2);
}

#[rstest]
fn search_before_index_is_an_error(temp_dir: TempDir) {
    let result = search_by_text(
        &StubEmbedder,
        temp_dir.path(),
        "anything",
        5,
        SortMode::Similarity,
        &storage_opts(),
    );
    assert!(matches!(result, Err(Error::NotIndexed(_))));
}

#[rstest]
fn index_on_missing_folder_is_an_error(temp_dir: TempDir) {
    let missing = temp_dir.path().join("no-such-dir");
    let result = index_folder(&StubEmbedder, &missing, &embed_opts(), &storage_opts());
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[rstest]
fn recency_sort_orders_by_mtime(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("old.jpg"), "sunset").unwrap();
    sleep(Duration::from_millis(20));
    fs::write(folder.join("new.jpg"), "sunrise").unwrap();

    index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();

    let hits =
        search_by_text(&StubEmbedder, folder, "sun", 5, SortMode::Time, &storage_opts()).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].filename, "new.jpg");
    assert_eq!(hits[1].filename, "old.jpg");
}

#[rstest]
fn search_by_image_finds_identical_content(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("a.jpg"), "distinct content a").unwrap();
    fs::write(folder.join("b.jpg"), "distinct content b").unwrap();

    index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();

    let hits = search_by_image(
        &StubEmbedder,
        folder,
        b"distinct content b",
        1,
        SortMode::Similarity,
        &storage_opts(),
    )
    .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "b.jpg");
    assert!(hits[0].score > 0.999);
}

#[rstest]
fn corrupt_index_forces_full_reindex(temp_dir: TempDir) {
    let folder = temp_dir.path();
    fs::write(folder.join("a.jpg"), "one").unwrap();
    fs::write(folder.join("b.jpg"), "two").unwrap();
    index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();

    // 破坏路径列表后，下一次索引从零开始重建全部记录
    let dir = storage_opts().index_dir(&folder.canonicalize().unwrap());
    fs::write(dir.paths(), "not json").unwrap();

    let report = index_folder(&StubEmbedder, folder, &embed_opts(), &storage_opts()).unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(report.total_indexed, 2);
}
