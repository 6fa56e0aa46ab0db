use std::io;
use std::path::Path;

use thiserror::Error;

/// 核心错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 图片字节无法解码
    #[error("failed to decode image: {0}")]
    Decode(String),
    /// 模型加载或推理失败
    #[error("embedding model error: {0}")]
    Model(String),
    /// 持久化的索引文件损坏或互相不一致
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
    /// 目录尚未建立索引
    #[error("folder not indexed: {0}")]
    NotIndexed(String),
    /// 请求参数非法
    #[error("{0}")]
    Validation(String),
    /// 向量索引内部错误
    #[error("vector index error: {0}")]
    VectorIndex(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_indexed(folder: &Path) -> Self {
        Self::NotIndexed(folder.display().to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
