use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, TextEmbedding,
    TextInitOptions,
};
use log::debug;

use crate::error::{Error, Result};

/// 支持的 CLIP 模型变体
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// OpenAI CLIP ViT-B/32
    ClipVitB32,
    /// 图像侧使用 Unicom ViT-B/32，文本侧仍为 CLIP
    UnicomVitB32,
}

impl ModelVariant {
    fn image_model(self) -> ImageEmbeddingModel {
        match self {
            Self::ClipVitB32 => ImageEmbeddingModel::ClipVitB32,
            Self::UnicomVitB32 => ImageEmbeddingModel::UnicomVitB32,
        }
    }

    /// 嵌入向量的维度
    pub fn dimensions(self) -> usize {
        512
    }
}

/// 文本和图片的共享嵌入空间
///
/// 实现者必须保证返回的向量为单位长度，且文本和图片位于同一空间
pub trait Embedder: Send + Sync {
    /// 嵌入向量的维度
    fn dimensions(&self) -> usize;

    /// 将一段文本编码为单位长度的向量
    ///
    /// 超过模型 token 上限的文本会被分词器截断
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// 将一张图片编码为单位长度的向量
    fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    /// 将内存中的图片字节编码为单位长度的向量
    fn embed_image_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>>;

    /// 按 batch_size 分批嵌入图片
    ///
    /// 单张图片的失败不影响已完成的批次，失败的图片以 Err 返回
    fn embed_images(
        &self,
        paths: &[PathBuf],
        batch_size: usize,
    ) -> Vec<(PathBuf, Result<Vec<f32>>)> {
        let _ = batch_size;
        paths.iter().map(|p| (p.clone(), self.embed_image(p))).collect()
    }
}

/// 基于 fastembed ONNX 模型的 CLIP 嵌入器
///
/// 模型在进程内只加载一次，加载完成后可跨线程只读共享
pub struct ClipEmbedder {
    image_model: ImageEmbedding,
    text_model: TextEmbedding,
    dim: usize,
}

impl ClipEmbedder {
    pub fn new(variant: ModelVariant) -> Result<Self> {
        debug!("loading embedding models: {variant:?}");
        let image_model = ImageEmbedding::try_new(ImageInitOptions::new(variant.image_model()))
            .map_err(|e| Error::Model(e.to_string()))?;
        let text_model = TextEmbedding::try_new(TextInitOptions::new(EmbeddingModel::ClipVitB32))
            .map_err(|e| Error::Model(e.to_string()))?;
        Ok(Self { image_model, text_model, dim: variant.dimensions() })
    }
}

impl Embedder for ClipEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self
            .text_model
            .embed(vec![text], None)
            .map_err(|e| Error::Model(e.to_string()))?;
        let v = out.pop().ok_or_else(|| Error::Model("empty text embedding".to_string()))?;
        Ok(l2_normalize(v))
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let mut out = self
            .image_model
            .embed(vec![path.to_string_lossy().into_owned()], None)
            .map_err(|e| classify_image_error(path, e))?;
        let v = out.pop().ok_or_else(|| Error::Model("empty image embedding".to_string()))?;
        Ok(l2_normalize(v))
    }

    fn embed_image_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        let file = tempfile::Builder::new().suffix(".png").tempfile()?;
        img.save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| Error::Io(io::Error::other(e)))?;
        self.embed_image(file.path())
    }

    fn embed_images(
        &self,
        paths: &[PathBuf],
        batch_size: usize,
    ) -> Vec<(PathBuf, Result<Vec<f32>>)> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(batch_size) {
            let names = chunk.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>();
            match self.image_model.embed(names, None) {
                Ok(embs) => {
                    for (path, emb) in chunk.iter().zip(embs) {
                        results.push((path.clone(), Ok(l2_normalize(emb))));
                    }
                }
                // 整批失败时退化为逐张嵌入，只跳过真正坏掉的图片
                Err(e) => {
                    debug!("batch embed failed, falling back to per-image: {e}");
                    for path in chunk {
                        results.push((path.clone(), self.embed_image(path)));
                    }
                }
            }
        }
        results
    }
}

/// 区分坏图片和模型故障：能被解码的图片报模型错误，否则报解码错误
fn classify_image_error(path: &Path, err: impl std::fmt::Display) -> Error {
    match image::open(path) {
        Err(e) => Error::Decode(format!("{}: {}", path.display(), e)),
        Ok(_) => Error::Model(err.to_string()),
    }
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
