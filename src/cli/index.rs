use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, StorageOptions};
use crate::embed::ClipEmbedder;
use crate::indexer;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub storage: StorageOptions,
    /// 要索引的图片目录
    pub path: PathBuf,
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let embedder = block_in_place(|| ClipEmbedder::new(self.embed.model))?;

        let pb = ProgressBar::new_spinner().with_style(pb_style());
        pb.set_message(format!("正在索引 {}", self.path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));

        let report = block_in_place(|| {
            indexer::index_folder(&embedder, &self.path, &self.embed, &self.storage)
        })?;

        pb.finish_with_message(format!(
            "索引完成：新增 {}，更新 {}，删除 {}，跳过 {}，共 {} 张",
            report.added,
            report.updated,
            report.removed,
            report.skipped_errors,
            report.total_indexed
        ));
        Ok(())
    }
}
