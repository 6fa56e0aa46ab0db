use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::task::block_in_place;

use super::error::{ApiError, Result};
use super::state::AppState;
use super::types::*;
use crate::comments::CommentStore;
use crate::config::IndexDir;
use crate::error::Error;
use crate::indexer::{self, IndexReport, SearchHit, SortMode};
use crate::store::IndexState;
use crate::utils;

/// 增量索引一个目录
#[utoipa::path(
    post,
    path = "/index",
    request_body = IndexRequest,
    responses(
        (status = 200, body = IndexReport),
    )
)]
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexReport>> {
    let folder = utils::canonical_folder(Path::new(&req.folder))?;
    info!("indexing {}", folder.display());

    let lock = state.folder_lock(&folder);
    let _guard = lock.lock().await;
    let report = block_in_place(|| {
        indexer::index_folder(&*state.embedder, &folder, &state.opts.embed, &state.opts.storage)
    })?;
    Ok(Json(report))
}

/// 用自然语言搜索目录中的图片
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let folder = utils::canonical_folder(Path::new(&req.folder))?;
    let k = state.opts.result.clamp_count(req.count);
    info!("searching {} for {:?}", folder.display(), req.query);

    let start = Instant::now();
    let lock = state.folder_lock(&folder);
    let guard = lock.lock().await;
    let hits = block_in_place(|| {
        indexer::search_by_text(
            &*state.embedder,
            &folder,
            &req.query,
            k,
            req.sort_by,
            &state.opts.storage,
        )
    })?;
    drop(guard);

    let results = block_in_place(|| to_result_items(&state, hits));
    Ok(Json(SearchResponse { time: start.elapsed().as_millis(), results }))
}

/// 用上传的图片搜索目录中的相似图片
#[utoipa::path(
    post,
    path = "/search_by_image",
    request_body(content = SearchByImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_by_image_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<SearchByImageRequest>,
) -> Result<Json<SearchResponse>> {
    let folder = utils::canonical_folder(Path::new(&data.folder))?;
    let k = state.opts.result.clamp_count(data.count);
    let sort_by: SortMode =
        data.sort_by.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default();
    info!("searching {} by uploaded image ({} bytes)", folder.display(), data.file.len());

    let start = Instant::now();
    let lock = state.folder_lock(&folder);
    let guard = lock.lock().await;
    let hits = block_in_place(|| {
        indexer::search_by_image(
            &*state.embedder,
            &folder,
            &data.file,
            k,
            sort_by,
            &state.opts.storage,
        )
    })?;
    drop(guard);

    let results = block_in_place(|| to_result_items(&state, hits));
    Ok(Json(SearchResponse { time: start.elapsed().as_millis(), results }))
}

/// 查询某个目录是否已建立索引
#[utoipa::path(
    post,
    path = "/check_index",
    request_body = CheckIndexRequest,
    responses(
        (status = 200, body = CheckIndexResponse),
    )
)]
pub async fn check_index_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckIndexRequest>,
) -> Result<Json<CheckIndexResponse>> {
    let folder = utils::canonical_folder(Path::new(&req.folder))?;
    let dir = state.opts.storage.index_dir(&folder);

    if !dir.exists() {
        return Ok(Json(CheckIndexResponse { indexed: false, count: None, last_indexed: None }));
    }
    let resp = block_in_place(|| match IndexState::load(&dir, state.embedder.dimensions()) {
        Ok(index) => CheckIndexResponse {
            indexed: true,
            count: Some(index.len()),
            last_indexed: last_indexed(&dir),
        },
        Err(e) => {
            warn!("check_index on {}: {e}", dir.path().display());
            CheckIndexResponse { indexed: false, count: None, last_indexed: None }
        }
    });
    Ok(Json(resp))
}

/// 返回一张图片的原始内容
#[utoipa::path(
    get,
    path = "/image/{path}",
    responses(
        (status = 200, description = "图片原始字节"),
        (status = 404, description = "文件不存在"),
    )
)]
pub async fn image_handler(UrlPath(path): UrlPath<String>) -> Result<Response> {
    let path = PathBuf::from(&path);
    // 禁止路径穿越
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ApiError(Error::Validation("parent refs not allowed".to_string())));
    }
    // axum 的通配符不包含前导斜杠
    let path = if path.is_absolute() { path } else { Path::new("/").join(path) };
    if !path.is_file() {
        return Ok((StatusCode::NOT_FOUND, "image not found").into_response());
    }

    let bytes = block_in_place(|| std::fs::read(&path)).map_err(Error::from)?;
    Ok(([(header::CONTENT_TYPE, utils::image_content_type(&path))], bytes).into_response())
}

/// 获取某张图片的全部评论
#[utoipa::path(
    get,
    path = "/comments",
    params(CommentsQuery),
    responses(
        (status = 200, body = CommentsResponse),
    )
)]
pub async fn get_comments_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<CommentsResponse>> {
    let folder = utils::canonical_folder(Path::new(&query.folder))?;
    let dir = state.opts.storage.index_dir(&folder);
    let comments = CommentStore::load(&dir).for_path(&query.path).to_vec();
    Ok(Json(CommentsResponse { comments }))
}

/// 为图片追加一条评论
#[utoipa::path(
    post,
    path = "/comments",
    request_body = AddCommentRequest,
    responses(
        (status = 200, body = CommentsResponse),
    )
)]
pub async fn add_comment_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddCommentRequest>,
) -> Result<Json<CommentsResponse>> {
    let folder = utils::canonical_folder(Path::new(&req.folder))?;
    let dir = state.opts.storage.index_dir(&folder);

    // 评论的读改写与索引共用同一把目录锁
    let lock = state.folder_lock(&folder);
    let _guard = lock.lock().await;
    let mut store = CommentStore::load(&dir);
    store.add(&req.path, &req.comment, state.opts.max_comment_length)?;
    store.save(&dir)?;
    Ok(Json(CommentsResponse { comments: store.for_path(&req.path).to_vec() }))
}

/// 列出目录下所有带评论的图片
#[utoipa::path(
    post,
    path = "/commented_images",
    request_body = CommentedImagesRequest,
    responses(
        (status = 200, body = [CommentedImageItem]),
    )
)]
pub async fn commented_images_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommentedImagesRequest>,
) -> Result<Json<Vec<CommentedImageItem>>> {
    let folder = utils::canonical_folder(Path::new(&req.folder))?;
    let dir = state.opts.storage.index_dir(&folder);

    let items = block_in_place(|| -> crate::error::Result<_> {
        let index = IndexState::load_or_empty(&dir, state.embedder.dimensions())?;
        let comments = CommentStore::load(&dir);
        let items = comments
            .summaries()
            .into_iter()
            .map(|summary| {
                let meta = index.find(&summary.path).map(|row| index.meta_at(row));
                let thumbnail = utils::thumbnail_base64(
                    Path::new(&summary.path),
                    state.opts.thumbnail_size,
                    state.opts.thumbnail_quality,
                )
                .ok();
                let filename = Path::new(&summary.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                CommentedImageItem {
                    filename,
                    path: summary.path,
                    comment_count: summary.comment_count,
                    latest_comment: summary.latest_comment,
                    mtime: meta.map(|m| m.mtime),
                    size: meta.map(|m| m.size),
                    thumbnail,
                }
            })
            .collect::<Vec<_>>();
        Ok(items)
    })?;
    Ok(Json(items))
}

/// 为搜索结果生成缩略图，单张失败不影响整个响应
fn to_result_items(state: &AppState, hits: Vec<SearchHit>) -> Vec<SearchResultItem> {
    hits.into_iter()
        .map(|hit| {
            let thumbnail = utils::thumbnail_base64(
                Path::new(&hit.path),
                state.opts.thumbnail_size,
                state.opts.thumbnail_quality,
            )
            .map_err(|e| warn!("thumbnail failed for {}: {e}", hit.path))
            .ok();
            SearchResultItem {
                path: hit.path,
                filename: hit.filename,
                similarity: hit.score,
                mtime: hit.mtime,
                size: hit.size,
                thumbnail,
            }
        })
        .collect()
}

fn last_indexed(dir: &IndexDir) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(dir.meta()).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
