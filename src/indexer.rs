use std::cmp::Ordering;
use std::collections::HashSet;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::{EmbedOptions, StorageOptions};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{ImageMeta, ImageRecord, IndexState};
use crate::utils::{canonical_folder, mtime_secs};

/// 一次索引运行的统计结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct IndexReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped_errors: usize,
    pub total_indexed: usize,
}

/// 搜索结果的排序方式
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// 相似度降序
    #[default]
    Similarity,
    /// 修改时间降序
    Time,
}

impl FromStr for SortMode {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "time" => Ok(Self::Time),
            _ => Ok(Self::Similarity),
        }
    }
}

/// 一条搜索结果
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub filename: String,
    pub score: f32,
    pub mtime: f64,
    pub size: u64,
}

/// 增量索引一个目录
///
/// 扫描目录中受支持的图片，与上一次持久化的元数据比对，
/// 只为新增和发生变化的文件计算嵌入，删除磁盘上已不存在的记录，
/// 最后整体持久化一次。目录内容未变化时重复运行不产生任何改动。
pub fn index_folder(
    embedder: &dyn Embedder,
    folder: &Path,
    embed: &EmbedOptions,
    storage: &StorageOptions,
) -> Result<IndexReport> {
    let folder = canonical_folder(folder)?;
    let dir = storage.index_dir(&folder);
    let mut state = IndexState::load_or_empty(&dir, embedder.dimensions())?;

    let scanned = scan(&folder, &storage.suffix)?;
    info!("scanned {} image files in {}", scanned.len(), folder.display());

    // 只有 (mtime, size) 发生变化的文件才需要重新嵌入
    let mut pending = Vec::new();
    let mut seen = HashSet::new();
    for (path, meta) in scanned {
        let key = path.to_string_lossy().into_owned();
        seen.insert(key);
        let path_str = path.to_string_lossy();
        match state.find(&path_str) {
            Some(row) if state.meta_at(row) == meta => {}
            Some(_) => pending.push((path, meta, true)),
            None => pending.push((path, meta, false)),
        }
    }
    let removed_paths =
        state.paths().iter().filter(|p| !seen.contains(*p)).cloned().collect::<Vec<_>>();

    let mut report = IndexReport::default();

    let to_embed = pending.iter().map(|(p, ..)| p.clone()).collect::<Vec<_>>();
    let embedded = embedder.embed_images(&to_embed, embed.batch_size);
    let mut upserts = Vec::new();
    for ((path, meta, is_update), (_, result)) in pending.into_iter().zip(embedded) {
        match result {
            Ok(embedding) => {
                upserts.push(ImageRecord {
                    path: path.to_string_lossy().into_owned(),
                    embedding,
                    mtime: meta.mtime,
                    size: meta.size,
                });
                if is_update {
                    report.updated += 1;
                } else {
                    report.added += 1;
                }
            }
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                report.skipped_errors += 1;
            }
        }
    }

    state.upsert_all(upserts)?;
    report.removed = state.remove_all(&removed_paths)?;
    report.total_indexed = state.len();
    state.save(&dir)?;

    info!(
        "indexed {}: {} added, {} updated, {} removed, {} skipped, {} total",
        folder.display(),
        report.added,
        report.updated,
        report.removed,
        report.skipped_errors,
        report.total_indexed
    );
    Ok(report)
}

/// 用一段文本查询目录中最相似的 k 张图片
pub fn search_by_text(
    embedder: &dyn Embedder,
    folder: &Path,
    query: &str,
    k: usize,
    sort: SortMode,
    storage: &StorageOptions,
) -> Result<Vec<SearchHit>> {
    let vector = embedder.embed_text(query)?;
    search_by_vector(embedder, folder, &vector, k, sort, storage)
}

/// 用一张图片查询目录中最相似的 k 张图片
pub fn search_by_image(
    embedder: &dyn Embedder,
    folder: &Path,
    image_bytes: &[u8],
    k: usize,
    sort: SortMode,
    storage: &StorageOptions,
) -> Result<Vec<SearchHit>> {
    let vector = embedder.embed_image_bytes(image_bytes)?;
    search_by_vector(embedder, folder, &vector, k, sort, storage)
}

fn search_by_vector(
    embedder: &dyn Embedder,
    folder: &Path,
    vector: &[f32],
    k: usize,
    sort: SortMode,
    storage: &StorageOptions,
) -> Result<Vec<SearchHit>> {
    let folder = canonical_folder(folder)?;
    let dir = storage.index_dir(&folder);
    if !dir.exists() {
        return Err(Error::not_indexed(&folder));
    }
    // 损坏的索引等同于没有索引，不能部分采信
    let state = match IndexState::load(&dir, embedder.dimensions()) {
        Ok(state) => state,
        Err(Error::CorruptIndex(e)) => {
            warn!("corrupt index at {}: {e}", dir.path().display());
            return Err(Error::not_indexed(&folder));
        }
        Err(e) => return Err(e),
    };

    let mut hits = state
        .query(vector, k)?
        .into_iter()
        .map(|(score, record)| {
            let filename = Path::new(&record.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            SearchHit { filename, path: record.path, score, mtime: record.mtime, size: record.size }
        })
        .collect::<Vec<_>>();

    if sort == SortMode::Time {
        hits.sort_by(|a, b| b.mtime.partial_cmp(&a.mtime).unwrap_or(Ordering::Equal));
    }
    Ok(hits)
}

/// 枚举目录下（不含子目录）所有受支持的图片文件
fn scan(folder: &Path, suffix: &str) -> Result<Vec<(PathBuf, ImageMeta)>> {
    let re = format!("(?i)^({})$", suffix.replace(',', "|"));
    let re = Regex::new(&re).expect("failed to build regex");

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if path.extension().map(|s| re.is_match(&s.to_string_lossy())) != Some(true) {
            continue;
        }
        let md = std::fs::metadata(&path)?;
        files.push((path, ImageMeta { mtime: mtime_secs(&md), size: md.len() }));
    }
    // 报告与磁盘枚举顺序无关
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
