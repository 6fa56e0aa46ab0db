use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::fs::File;
use std::path::Path;

use log::{debug, warn};
use ndarray::prelude::*;
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::config::IndexDir;
use crate::error::{Error, Result};
use crate::utils::tmp_path;

/// 一张已索引图片的文件元数据，与路径列表按行对齐
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub mtime: f64,
    pub size: u64,
}

/// 一张已索引图片的完整记录
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub path: String,
    pub embedding: Vec<f32>,
    pub mtime: f64,
    pub size: u64,
}

/// 单个目录的内存索引状态
///
/// 不变量：向量索引的第 i 行、嵌入矩阵的第 i 行、paths[i] 和 meta[i]
/// 永远指向同一张图片。任何增删都会整体重建向量索引，不复用旧行号。
pub struct IndexState {
    dim: usize,
    paths: Vec<String>,
    meta: Vec<ImageMeta>,
    embeddings: Array2<f32>,
    index: Index,
}

impl IndexState {
    /// 创建一个空索引
    pub fn new(dim: usize) -> Result<Self> {
        Ok(Self {
            dim,
            paths: Vec::new(),
            meta: Vec::new(),
            embeddings: Array2::zeros((0, dim)),
            index: new_vector_index(dim)?,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dim
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn find(&self, path: &str) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    pub fn meta_at(&self, row: usize) -> ImageMeta {
        self.meta[row]
    }

    pub fn record(&self, row: usize) -> ImageRecord {
        ImageRecord {
            path: self.paths[row].clone(),
            embedding: self.embeddings.row(row).to_vec(),
            mtime: self.meta[row].mtime,
            size: self.meta[row].size,
        }
    }

    /// 插入或替换一条记录，随后重建向量索引
    pub fn upsert(&mut self, record: ImageRecord) -> Result<()> {
        self.put(record)?;
        self.rebuild()
    }

    /// 批量插入或替换，完成后只重建一次向量索引
    pub fn upsert_all(&mut self, records: Vec<ImageRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            self.put(record)?;
        }
        self.rebuild()
    }

    /// 删除一条记录，返回是否确实存在，随后重建向量索引
    pub fn remove(&mut self, path: &str) -> Result<bool> {
        Ok(self.remove_all(&[path.to_string()])? == 1)
    }

    /// 批量删除，返回实际删除的数量，完成后只重建一次向量索引
    pub fn remove_all(&mut self, paths: &[String]) -> Result<usize> {
        let victims = paths.iter().collect::<HashSet<_>>();
        let keep = (0..self.paths.len())
            .filter(|&i| !victims.contains(&self.paths[i]))
            .collect::<Vec<_>>();
        let removed = self.paths.len() - keep.len();
        if removed == 0 {
            return Ok(0);
        }
        let paths = keep.iter().map(|&i| self.paths[i].clone()).collect();
        let meta = keep.iter().map(|&i| self.meta[i]).collect();
        self.paths = paths;
        self.meta = meta;
        self.embeddings = self.embeddings.select(Axis(0), &keep);
        self.rebuild()?;
        Ok(removed)
    }

    fn put(&mut self, record: ImageRecord) -> Result<()> {
        if record.embedding.len() != self.dim {
            return Err(Error::VectorIndex(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dim,
                record.embedding.len()
            )));
        }
        let meta = ImageMeta { mtime: record.mtime, size: record.size };
        let row = ArrayView1::from(record.embedding.as_slice());
        match self.find(&record.path) {
            Some(i) => {
                self.embeddings.row_mut(i).assign(&row);
                self.meta[i] = meta;
            }
            None => {
                self.embeddings.push_row(row).map_err(|e| Error::VectorIndex(e.to_string()))?;
                self.paths.push(record.path);
                self.meta.push(meta);
            }
        }
        Ok(())
    }

    /// 返回与查询向量内积最高的 k 条记录
    ///
    /// 记录不足 k 条时返回全部；得分并列时先插入的记录排在前面
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(f32, ImageRecord)>> {
        if vector.len() != self.dim {
            return Err(Error::VectorIndex(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dim,
                vector.len()
            )));
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        // 候选行取自向量索引，再用精确内积重排一次，
        // 这样并列得分的输出顺序不受近似搜索影响
        let rows = if k == self.len() {
            (0..self.len()).collect::<Vec<_>>()
        } else {
            let matches =
                self.index.search(vector, k).map_err(|e| Error::VectorIndex(e.to_string()))?;
            let mut rows = matches.keys.iter().map(|&key| key as usize).collect::<Vec<_>>();
            rows.sort_unstable();
            rows.dedup();
            rows
        };

        let q = ArrayView1::from(vector);
        let mut scored = rows
            .into_iter()
            .map(|r| (self.embeddings.row(r).dot(&q), r))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(score, r)| (score, self.record(r))).collect())
    }

    /// 原子化地持久化索引：全部写入临时文件后再依次替换正式文件
    ///
    /// paths.json 最后替换，它的存在意味着其余文件已经就位
    pub fn save(&self, dir: &IndexDir) -> Result<()> {
        fs::create_dir_all(dir.path())?;

        let emb_tmp = tmp_path(&dir.embeddings());
        let vec_tmp = tmp_path(&dir.vectors());
        let meta_tmp = tmp_path(&dir.meta());
        let paths_tmp = tmp_path(&dir.paths());

        write_npy(&emb_tmp, &self.embeddings)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.index
            .save(path_str(&vec_tmp)?)
            .map_err(|e| Error::VectorIndex(e.to_string()))?;
        serde_json::to_writer(File::create(&meta_tmp)?, &self.meta)?;
        serde_json::to_writer(File::create(&paths_tmp)?, &self.paths)?;

        fs::rename(&emb_tmp, dir.embeddings())?;
        fs::rename(&vec_tmp, dir.vectors())?;
        fs::rename(&meta_tmp, dir.meta())?;
        fs::rename(&paths_tmp, dir.paths())?;

        debug!("saved index with {} entries to {}", self.len(), dir.path().display());
        Ok(())
    }

    /// 加载持久化的索引；索引不存在时返回空状态
    ///
    /// 文件缺失、无法解析或各文件长度不一致时返回 CorruptIndex，
    /// 调用方应当视为空索引并执行一次全量重建，绝不部分采信
    pub fn load(dir: &IndexDir, dim: usize) -> Result<Self> {
        if !dir.exists() {
            return Self::new(dim);
        }

        let paths: Vec<String> = File::open(dir.paths())
            .map_err(|e| Error::CorruptIndex(format!("paths: {e}")))
            .and_then(|f| {
                serde_json::from_reader(f).map_err(|e| Error::CorruptIndex(format!("paths: {e}")))
            })?;
        let meta: Vec<ImageMeta> = File::open(dir.meta())
            .map_err(|e| Error::CorruptIndex(format!("meta: {e}")))
            .and_then(|f| {
                serde_json::from_reader(f).map_err(|e| Error::CorruptIndex(format!("meta: {e}")))
            })?;
        let embeddings: Array2<f32> = read_npy(dir.embeddings())
            .map_err(|e| Error::CorruptIndex(format!("embeddings: {e}")))?;

        if embeddings.ncols() != dim {
            return Err(Error::CorruptIndex(format!(
                "embedding dimension mismatch: expected {dim}, got {}",
                embeddings.ncols()
            )));
        }
        if paths.len() != meta.len() || paths.len() != embeddings.nrows() {
            return Err(Error::CorruptIndex(format!(
                "length mismatch: {} paths, {} meta, {} vectors",
                paths.len(),
                meta.len(),
                embeddings.nrows()
            )));
        }

        let index = new_vector_index(dim)?;
        index
            .load(path_str(&dir.vectors())?)
            .map_err(|e| Error::CorruptIndex(format!("vector index: {e}")))?;
        if index.size() != paths.len() {
            return Err(Error::CorruptIndex(format!(
                "vector index has {} entries, expected {}",
                index.size(),
                paths.len()
            )));
        }

        Ok(Self { dim, paths, meta, embeddings, index })
    }

    /// 加载索引，损坏时记录日志并返回空状态
    pub fn load_or_empty(dir: &IndexDir, dim: usize) -> Result<Self> {
        match Self::load(dir, dim) {
            Ok(state) => Ok(state),
            Err(Error::CorruptIndex(e)) => {
                warn!("discarding corrupt index at {}: {e}", dir.path().display());
                Self::new(dim)
            }
            Err(e) => Err(e),
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        let index = new_vector_index(self.dim)?;
        index.reserve(self.len()).map_err(|e| Error::VectorIndex(e.to_string()))?;
        for (i, row) in self.embeddings.rows().into_iter().enumerate() {
            index
                .add(i as u64, &row.to_vec())
                .map_err(|e| Error::VectorIndex(e.to_string()))?;
        }
        self.index = index;
        Ok(())
    }
}

fn new_vector_index(dim: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions: dim,
        // 单位向量的内积即余弦相似度
        metric: MetricKind::IP,
        quantization: ScalarKind::F32,
        ..Default::default()
    };
    Index::new(&options).map_err(|e| Error::VectorIndex(e.to_string()))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Validation(format!("non-utf8 path: {}", path.display())))
}
