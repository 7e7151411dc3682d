//! アップロード前の画像準備モジュール
//!
//! 撮影した写真を一定幅に縮小し、JPEGに再エンコードしてから
//! 解析サーバーへ送る。同じ入力と設定に対して常に同じ結果を返す。

use crate::error::{Result, ZyaratError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// 撮影写真の情報
#[derive(Debug, Clone)]
pub struct PhotoInfo {
    pub path: PathBuf,
    pub file_name: String,
    /// EXIFから読み取った撮影日時（無ければNone）
    pub date: Option<String>,
}

/// リサイズ・再エンコード設定
#[derive(Debug, Clone, Copy)]
pub struct PrepareSettings {
    /// 最大ピクセル幅（これより大きい画像のみ縮小）
    pub max_width: u32,
    /// JPEG品質 (0-100)
    pub jpeg_quality: u8,
}

impl Default for PrepareSettings {
    fn default() -> Self {
        Self {
            max_width: 900,
            jpeg_quality: 80,
        }
    }
}

/// 準備済み画像（アップロードペイロード）
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

/// 撮影写真の情報を読み取る
pub fn read_photo_info(path: &Path) -> Result<PhotoInfo> {
    if !path.exists() {
        return Err(ZyaratError::FileNotFound(path.display().to_string()));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let date = extract_date(path).ok();

    Ok(PhotoInfo {
        path: path.to_path_buf(),
        file_name,
        date,
    })
}

/// 画像を準備する
///
/// `max_width` を超える幅の画像はアスペクト比を保って縮小し、
/// 固定品質のJPEGに再エンコードする。拡大は行わない。
///
/// # Errors
/// 画像が読めない・壊れている場合は `ImagePreparation`（このスキャンは中断）
pub fn prepare_image(path: &Path, settings: &PrepareSettings) -> Result<PreparedImage> {
    if !path.exists() {
        return Err(ZyaratError::FileNotFound(path.display().to_string()));
    }

    let img = image::open(path)
        .map_err(|e| ZyaratError::ImagePreparation(format!("{}: {}", path.display(), e)))?;

    let resized = if img.width() > settings.max_width {
        // resizeはアスペクト比を保ったままmax_width以内に収める
        img.resize(settings.max_width, u32::MAX, FilterType::Triangle)
    } else {
        img
    };

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, settings.jpeg_quality);
    resized
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ZyaratError::ImagePreparation(format!("JPEGエンコード失敗: {}", e)))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact.jpg".to_string());

    tracing::debug!(
        file = %file_name,
        width = resized.width(),
        height = resized.height(),
        bytes = jpeg.len(),
        "画像準備完了"
    );

    Ok(PreparedImage {
        width: resized.width(),
        height: resized.height(),
        jpeg,
        file_name,
    })
}

/// 準備済みJPEGをスキャン用スクラッチディレクトリに書き出す
///
/// 結果画面には実ファイルのパスを渡すため、リサイズ済み画像を
/// 一時ディレクトリに保存してそのパスを返す
pub fn write_prepared(image: &PreparedImage) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join("zyarat-scans");
    std::fs::create_dir_all(&dir)?;

    let stem = Path::new(&image.file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let dest = dir.join(format!("{}-prepared.jpg", stem));

    std::fs::write(&dest, &image.jpeg)?;
    Ok(dest)
}

/// EXIFから撮影日時を読み取る
fn extract_date(path: &Path) -> std::result::Result<String, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut bufreader = BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut bufreader)?;

    // DateTimeOriginal を優先、なければ DateTime
    if let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
        return Ok(field.display_value().to_string());
    }

    if let Some(field) = exif.get_field(exif::Tag::DateTime, exif::In::PRIMARY) {
        return Ok(field.display_value().to_string());
    }

    Err("No date found in EXIF".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    fn write_test_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        img.save(&path).expect("テスト画像の保存失敗");
        path
    }

    /// 大きい画像はmax_widthまで縮小される
    #[test]
    fn test_prepare_downscales_wide_image() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = write_test_jpeg(dir.path(), "wide.jpg", 1800, 1200);

        let settings = PrepareSettings {
            max_width: 900,
            jpeg_quality: 80,
        };
        let prepared = prepare_image(&path, &settings).unwrap();

        assert_eq!(prepared.width, 900);
        // アスペクト比維持
        assert_eq!(prepared.height, 600);
        assert!(!prepared.jpeg.is_empty());

        // 出力は有効なJPEG
        let decoded = image::load_from_memory(&prepared.jpeg).unwrap();
        assert_eq!(decoded.width(), 900);
    }

    /// 小さい画像は拡大しない
    #[test]
    fn test_prepare_does_not_upscale() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = write_test_jpeg(dir.path(), "small.jpg", 400, 300);

        let prepared = prepare_image(&path, &PrepareSettings::default()).unwrap();
        assert_eq!(prepared.width, 400);
        assert_eq!(prepared.height, 300);
    }

    /// 同じ入力・同じ設定なら同じ出力（冪等）
    #[test]
    fn test_prepare_is_deterministic() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = write_test_jpeg(dir.path(), "same.jpg", 1000, 800);

        let settings = PrepareSettings::default();
        let first = prepare_image(&path, &settings).unwrap();
        let second = prepare_image(&path, &settings).unwrap();

        assert_eq!(first.jpeg, second.jpeg);
        assert_eq!(first.width, second.width);
        assert_eq!(first.height, second.height);
    }

    /// 壊れたファイルはImagePreparationエラー
    #[test]
    fn test_prepare_corrupt_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();

        let result = prepare_image(&path, &PrepareSettings::default());
        assert!(matches!(
            result,
            Err(ZyaratError::ImagePreparation(_))
        ));
    }

    /// 存在しないファイルはFileNotFound
    #[test]
    fn test_prepare_missing_file() {
        let result = prepare_image(
            Path::new("/nonexistent/photo.jpg"),
            &PrepareSettings::default(),
        );
        assert!(matches!(result, Err(ZyaratError::FileNotFound(_))));
    }

    /// 準備済み画像の書き出し
    #[test]
    fn test_write_prepared() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = write_test_jpeg(dir.path(), "out.jpg", 600, 400);

        let prepared = prepare_image(&path, &PrepareSettings::default()).unwrap();
        let dest = write_prepared(&prepared).unwrap();

        assert!(dest.exists());
        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(bytes, prepared.jpeg);
    }

    /// EXIFなし画像でもPhotoInfoは読める
    #[test]
    fn test_read_photo_info_without_exif() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = write_test_jpeg(dir.path(), "plain.jpg", 100, 100);

        let info = read_photo_info(&path).unwrap();
        assert_eq!(info.file_name, "plain.jpg");
        assert!(info.date.is_none());
    }
}
