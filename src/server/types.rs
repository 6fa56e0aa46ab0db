use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::comments::CommentRecord;
use crate::indexer::SortMode;

/// 建立索引请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct IndexRequest {
    /// 要索引的图片目录
    pub folder: String,
}

/// 文本搜索请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 已索引的图片目录
    pub folder: String,
    /// 自然语言查询
    pub query: String,
    /// 返回结果数量，超出配置区间时使用默认值
    pub count: Option<usize>,
    /// 排序方式
    #[serde(default)]
    pub sort_by: SortMode,
}

/// 以图搜图请求
#[derive(TryFromMultipart)]
pub struct SearchByImageRequest {
    pub folder: String,
    pub count: Option<usize>,
    pub sort_by: Option<String>,
    pub file: Bytes,
}

/// 以图搜图表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchByImageForm {
    /// 已索引的图片目录
    pub folder: String,
    /// 返回结果数量
    pub count: Option<usize>,
    /// 排序方式，similarity 或 time
    pub sort_by: Option<String>,
    /// 上传的查询图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 单条搜索结果
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResultItem {
    pub path: String,
    pub filename: String,
    /// 内积相似度，越大越相似
    pub similarity: f32,
    /// 文件修改时间，自 Unix 纪元起的秒数
    pub mtime: f64,
    pub size: u64,
    /// base64 编码的 JPEG 缩略图，生成失败时为空
    pub thumbnail: Option<String>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u128,
    pub results: Vec<SearchResultItem>,
}

/// 查询索引状态请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckIndexRequest {
    pub folder: String,
}

/// 索引状态响应
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckIndexResponse {
    pub indexed: bool,
    /// 已索引的图片数量
    pub count: Option<usize>,
    /// 上一次索引完成的时间
    pub last_indexed: Option<DateTime<Utc>>,
}

/// 读取评论的查询参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct CommentsQuery {
    pub folder: String,
    pub path: String,
}

/// 追加评论请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCommentRequest {
    pub folder: String,
    pub path: String,
    pub comment: String,
}

/// 评论响应
#[derive(Debug, Serialize, ToSchema)]
pub struct CommentsResponse {
    pub comments: Vec<CommentRecord>,
}

/// 带评论图片汇总请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentedImagesRequest {
    pub folder: String,
}

/// 带评论图片汇总条目
#[derive(Debug, Serialize, ToSchema)]
pub struct CommentedImageItem {
    pub path: String,
    pub filename: String,
    pub comment_count: usize,
    pub latest_comment: CommentRecord,
    /// 仍在索引中的图片才有元数据
    pub mtime: Option<f64>,
    pub size: Option<u64>,
    pub thumbnail: Option<String>,
}
