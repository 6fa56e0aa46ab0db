use std::sync::Arc;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, ResultOptions, StorageOptions};
use crate::embed::ClipEmbedder;
use crate::server;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub result: ResultOptions,
    #[command(flatten)]
    pub storage: StorageOptions,
    /// 监听地址
    #[arg(long, env = "EVOSEARCH_ADDR", default_value = "127.0.0.1:5000")]
    pub addr: String,
    /// 缩略图最长边的像素数
    #[arg(long, value_name = "N", env = "EVOSEARCH_THUMBNAIL_SIZE", default_value_t = 400)]
    pub thumbnail_size: u32,
    /// 缩略图 JPEG 质量
    #[arg(long, value_name = "N", env = "EVOSEARCH_THUMBNAIL_QUALITY", default_value_t = 85)]
    pub thumbnail_quality: u8,
    /// 单条评论的最大字符数
    #[arg(long, value_name = "N", env = "EVOSEARCH_MAX_COMMENT_LENGTH", default_value_t = 100)]
    pub max_comment_length: usize,
    /// 上传大小限制，单位为 MB
    #[arg(long, value_name = "MB", env = "EVOSEARCH_MAX_FILE_SIZE_MB", default_value_t = 50)]
    pub max_upload_mb: usize,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        // 模型只加载一次，所有请求只读共享
        let embedder = Arc::new(block_in_place(|| ClipEmbedder::new(self.embed.model))?);

        // 创建应用状态
        let state = server::AppState::new(embedder, self.clone());

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
