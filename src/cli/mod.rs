mod index;
mod search;
pub mod server;

pub use index::*;
pub use search::*;
pub use server::*;

use clap::Subcommand;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 索引一个图片目录
    Index(IndexCommand),
    /// 用文本在已索引的目录中搜索图片
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
}
