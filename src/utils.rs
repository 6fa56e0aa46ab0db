use std::fs::Metadata;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use indicatif::ProgressStyle;

use crate::error::{Error, Result};

/// 生成 JPEG 缩略图并编码为 base64
pub fn thumbnail_base64(path: &Path, max_size: u32, quality: u8) -> Result<String> {
    let img = image::open(path).map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
    let thumb = img.thumbnail(max_size, max_size).to_rgb8();

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    encoder
        .encode(thumb.as_raw(), thumb.width(), thumb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
    Ok(BASE64.encode(&buf))
}

/// 根据扩展名推断图片的 Content-Type
pub fn image_content_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// 文件修改时间，自 Unix 纪元起的秒数
pub fn mtime_secs(meta: &Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// 校验并规范化被索引的目录路径
pub fn canonical_folder(folder: &Path) -> Result<PathBuf> {
    let canonical = folder
        .canonicalize()
        .map_err(|_| Error::Validation(format!("not a directory: {}", folder.display())))?;
    if !canonical.is_dir() {
        return Err(Error::Validation(format!("not a directory: {}", folder.display())));
    }
    Ok(canonical)
}

/// 在同一目录下为文件生成临时文件路径，保证 rename 不跨文件系统
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
        .expect("failed to build progress style")
}
