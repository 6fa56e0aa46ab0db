use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::SubCommand;
use crate::embed::ModelVariant;

#[derive(Parser, Debug, Clone)]
#[command(name = "evosearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// CLIP 模型变体
    #[arg(long, value_enum, env = "EVOSEARCH_CLIP_MODEL", default_value_t = ModelVariant::ClipVitB32)]
    pub model: ModelVariant,
    /// 批量嵌入时每批的图片数量
    #[arg(long, value_name = "N", env = "EVOSEARCH_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct ResultOptions {
    /// 返回结果数量下限
    #[arg(long, value_name = "N", env = "EVOSEARCH_MIN_RESULTS", default_value_t = 3)]
    pub min_results: usize,
    /// 未指定数量时返回的结果数量
    #[arg(long, value_name = "N", env = "EVOSEARCH_DEFAULT_RESULTS", default_value_t = 12)]
    pub default_results: usize,
    /// 返回结果数量上限
    #[arg(long, value_name = "N", env = "EVOSEARCH_MAX_RESULTS", default_value_t = 48)]
    pub max_results: usize,
}

impl ResultOptions {
    /// 将用户请求的结果数量收敛到配置的区间内
    pub fn clamp_count(&self, count: Option<usize>) -> usize {
        match count {
            Some(n) if n >= self.min_results && n <= self.max_results => n,
            _ => self.default_results,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct StorageOptions {
    /// 索引子目录的名称，位于被索引的目录内部
    #[arg(long, value_name = "NAME", env = "EVOSEARCH_INDEX_FOLDER", default_value = ".evosearch")]
    pub index_folder: String,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(long, env = "EVOSEARCH_SUFFIX", default_value = "jpg,jpeg,png,bmp,webp")]
    pub suffix: String,
}

impl StorageOptions {
    pub fn index_dir(&self, folder: &Path) -> IndexDir {
        IndexDir::new(folder, &self.index_folder)
    }
}

/// 单个被索引目录对应的索引子目录
#[derive(Debug, Clone)]
pub struct IndexDir {
    path: PathBuf,
}

impl IndexDir {
    pub fn new(folder: &Path, name: &str) -> Self {
        Self { path: folder.join(name) }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回向量索引文件的路径
    pub fn vectors(&self) -> PathBuf {
        self.path.join("index.usearch")
    }

    /// 返回嵌入矩阵文件的路径
    pub fn embeddings(&self) -> PathBuf {
        self.path.join("embeddings.npy")
    }

    /// 返回路径列表文件的路径
    pub fn paths(&self) -> PathBuf {
        self.path.join("paths.json")
    }

    /// 返回图片元数据文件的路径
    pub fn meta(&self) -> PathBuf {
        self.path.join("meta.json")
    }

    /// 返回评论文件的路径
    pub fn comments(&self) -> PathBuf {
        self.path.join("comments.json")
    }

    /// 索引是否已经存在
    pub fn exists(&self) -> bool {
        self.paths().exists()
    }
}
