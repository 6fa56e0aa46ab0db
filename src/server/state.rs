use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::cli::ServerCommand;
use crate::embed::Embedder;

/// 应用状态
pub struct AppState {
    /// 共享的嵌入模型
    pub embedder: Arc<dyn Embedder>,
    /// 服务器配置选项
    pub opts: ServerCommand,
    /// 目录锁注册表，按目录串行化 load-modify-save
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(embedder: Arc<dyn Embedder>, opts: ServerCommand) -> Arc<Self> {
        Arc::new(AppState { embedder, opts, locks: Mutex::new(HashMap::new()) })
    }

    /// 返回某个目录对应的互斥锁
    ///
    /// 同一目录的索引写入和评论写入都必须持有这把锁
    pub fn folder_lock(&self, folder: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("folder lock registry poisoned");
        locks.entry(folder.to_path_buf()).or_default().clone()
    }
}
