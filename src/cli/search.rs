use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, ResultOptions, StorageOptions};
use crate::embed::ClipEmbedder;
use crate::indexer::{self, SearchHit, SortMode};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub result: ResultOptions,
    #[command(flatten)]
    pub storage: StorageOptions,
    /// 已索引的图片目录
    pub folder: PathBuf,
    /// 自然语言查询
    pub query: String,
    /// 显示的结果数量
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub count: Option<usize>,
    /// 排序方式
    #[arg(long, value_enum, default_value_t = SortMode::Similarity)]
    pub sort_by: SortMode,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let embedder = block_in_place(|| ClipEmbedder::new(self.embed.model))?;
        let k = self.result.clamp_count(self.count);

        let hits = block_in_place(|| {
            indexer::search_by_text(
                &embedder,
                &self.folder,
                &self.query,
                k,
                self.sort_by,
                &self.storage,
            )
        })?;

        print_result(&hits, self)
    }
}

fn print_result(hits: &[SearchHit], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(hits)?)
        }
        OutputFormat::Table => {
            for hit in hits {
                println!("{:.4}\t{}", hit.score, hit.path);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
