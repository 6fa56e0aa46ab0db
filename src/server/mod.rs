mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::index_handler,
        api::search_handler,
        api::search_by_image_handler,
        api::check_index_handler,
        api::image_handler,
        api::get_comments_handler,
        api::add_comment_handler,
        api::commented_images_handler,
    ),
    components(schemas(
        types::IndexRequest,
        types::SearchRequest,
        types::SearchByImageForm,
        types::SearchResultItem,
        types::SearchResponse,
        types::CheckIndexRequest,
        types::CheckIndexResponse,
        types::AddCommentRequest,
        types::CommentsResponse,
        types::CommentedImagesRequest,
        types::CommentedImageItem,
        crate::comments::CommentRecord,
        crate::indexer::IndexReport,
        crate::indexer::SortMode,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let max_upload = state.opts.max_upload_mb * 1024 * 1024;
    Router::new()
        .route("/index", post(api::index_handler))
        .route("/search", post(api::search_handler))
        .route("/search_by_image", post(api::search_by_image_handler))
        .route("/check_index", post(api::check_index_handler))
        .route("/image/{*path}", get(api::image_handler))
        .route("/comments", get(api::get_comments_handler).post(api::add_comment_handler))
        .route("/commented_images", post(api::commented_images_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .with_state(state)
}
