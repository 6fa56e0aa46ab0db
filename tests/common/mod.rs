use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use evosearch::embed::Embedder;
use evosearch::error::{Error, Result};

pub const DIM: usize = 8;

/// 由内容哈希推导单位向量的确定性嵌入器，测试中替代真实模型
pub struct StubEmbedder;

impl StubEmbedder {
    fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        let mut seed = hasher.finish() | 1;

        let mut v = Vec::with_capacity(DIM);
        for _ in 0..DIM {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            v.push((seed % 1000) as f32 / 1000.0 + 0.001);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }
}

impl Embedder for StubEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector_from_bytes(text.as_bytes()))
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let bytes = std::fs::read(path)?;
        // 以 broken 开头的文件模拟无法解码的图片
        if bytes.starts_with(b"broken") {
            return Err(Error::Decode(format!("{}: unreadable", path.display())));
        }
        Ok(Self::vector_from_bytes(&bytes))
    }

    fn embed_image_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.starts_with(b"broken") {
            return Err(Error::Decode("unreadable bytes".to_string()));
        }
        Ok(Self::vector_from_bytes(bytes))
    }
}
