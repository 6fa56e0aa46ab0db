use std::collections::BTreeMap;
use std::fs;
use std::fs::File;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::IndexDir;
use crate::error::{Error, Result};
use crate::utils::tmp_path;

/// 一条评论，追加后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommentRecord {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// 带评论图片的汇总条目
#[derive(Debug, Clone, Serialize)]
pub struct CommentSummary {
    pub path: String,
    pub comment_count: usize,
    pub latest_comment: CommentRecord,
}

/// 以图片路径为键的追加式评论集合
///
/// 评论独立于索引存在，重建索引不影响已有评论
#[derive(Debug, Default, PartialEq)]
pub struct CommentStore {
    map: BTreeMap<String, Vec<CommentRecord>>,
}

impl CommentStore {
    /// 加载某个目录的全部评论，文件缺失或无法解析时返回空集合
    pub fn load(dir: &IndexDir) -> Self {
        let path = dir.comments();
        if !path.exists() {
            return Self::default();
        }
        let result = File::open(&path)
            .map_err(Error::from)
            .and_then(|f| serde_json::from_reader(f).map_err(Error::from));
        match result {
            Ok(map) => Self { map },
            Err(e) => {
                warn!("discarding unreadable comments at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// 持久化整个评论集合，写入临时文件后替换正式文件
    pub fn save(&self, dir: &IndexDir) -> Result<()> {
        fs::create_dir_all(dir.path())?;
        let path = dir.comments();
        let tmp = tmp_path(&path);
        serde_json::to_writer_pretty(File::create(&tmp)?, &self.map)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// 追加一条评论并返回它
    pub fn add(&mut self, path: &str, text: &str, max_len: usize) -> Result<CommentRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("comment must not be empty".to_string()));
        }
        if text.chars().count() > max_len {
            return Err(Error::Validation(format!("comment too long (max {max_len} characters)")));
        }
        let record = CommentRecord { text: text.to_string(), created_at: Utc::now() };
        self.map.entry(path.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    /// 某张图片的全部评论，最早的在前
    pub fn for_path(&self, path: &str) -> &[CommentRecord] {
        self.map.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 汇总所有带评论的图片，按最新评论时间降序
    pub fn summaries(&self) -> Vec<CommentSummary> {
        let mut out = self
            .map
            .iter()
            .filter_map(|(path, comments)| {
                comments.last().map(|latest| CommentSummary {
                    path: path.clone(),
                    comment_count: comments.len(),
                    latest_comment: latest.clone(),
                })
            })
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.latest_comment.created_at.cmp(&a.latest_comment.created_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut store = CommentStore::default();
        store.add("/a.jpg", "first", 100).unwrap();
        store.add("/a.jpg", "second", 100).unwrap();

        let comments = store.for_path("/a.jpg");
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "first");
        assert_eq!(comments[1].text, "second");
        assert!(comments[0].created_at <= comments[1].created_at);
    }

    #[test]
    fn rejects_empty_and_oversized() {
        let mut store = CommentStore::default();
        assert!(store.add("/a.jpg", "   ", 100).is_err());
        assert!(store.add("/a.jpg", &"x".repeat(101), 100).is_err());
        assert!(store.for_path("/a.jpg").is_empty());
    }

    #[test]
    fn summaries_sorted_by_latest() {
        let mut store = CommentStore::default();
        store.add("/a.jpg", "old", 100).unwrap();
        store.add("/b.jpg", "newer", 100).unwrap();

        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].path, "/b.jpg");
        assert_eq!(summaries[0].comment_count, 1);
    }
}
