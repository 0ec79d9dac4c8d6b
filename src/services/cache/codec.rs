// 图片编解码 - 解码、等比缩放与 WebP 编码
//
// 本模块提供：
// - Codec 抽象（解码 / 编码 / 缩放）
// - 基于 image + webp 的默认实现
// - 将 CPU 密集型操作移到阻塞线程池的异步辅助函数

use crate::services::cache::config::ResizePolicy;
use crate::services::cache::error::ConversionError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::sync::Arc;
use tokio::task;

/// 图片编解码能力
///
/// 图片句柄统一使用 `image::DynamicImage`
pub trait Codec: Send + Sync {
    /// 将原始数据解码为图片
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ConversionError>;

    /// 按压缩质量（0.0 ~ 1.0）编码图片
    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>, ConversionError>;

    /// 等比缩放
    fn resize(&self, image: &DynamicImage, policy: ResizePolicy) -> DynamicImage;
}

/// WebP 编解码器
///
/// 解码支持 jpg、png、gif（取第一帧）、webp；编码统一输出 WebP
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPCodec;

impl Codec for WebPCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ConversionError> {
        let format = image::guess_format(bytes).map_err(|e| {
            ConversionError::DecodeFailed(format!("无法识别图片格式: {}", e))
        })?;

        if format == ImageFormat::WebP {
            if let Some(decoded) = webp::Decoder::new(bytes).decode() {
                return Ok(decoded.to_image());
            }
        }

        image::load_from_memory(bytes)
            .map_err(|e| ConversionError::DecodeFailed(format!("图片解码失败: {}", e)))
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>, ConversionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ConversionError::CorruptedData);
        }

        // 转换为 RGBA8
        let rgba = image.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba, width, height);

        let quality = quality.clamp(0.0, 1.0);
        let webp_data = if quality >= 1.0 {
            encoder.encode_lossless()
        } else {
            encoder.encode(quality * 100.0)
        };

        if webp_data.is_empty() {
            return Err(ConversionError::EncodeFailed("WebP 编码结果为空".to_string()));
        }

        Ok(webp_data.to_vec())
    }

    fn resize(&self, image: &DynamicImage, policy: ResizePolicy) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = policy.target_dimensions(width, height);

        if (target_width, target_height) == (width, height) {
            return image.clone();
        }

        image.resize_exact(target_width, target_height, FilterType::Triangle)
    }
}

/// 在阻塞线程池中解码
pub async fn decode_blocking(
    codec: Arc<dyn Codec>,
    bytes: Arc<[u8]>,
) -> Result<DynamicImage, ConversionError> {
    task::spawn_blocking(move || codec.decode(&bytes))
        .await
        .map_err(|e| ConversionError::ConversionFailed(format!("任务执行失败: {}", e)))?
}

/// 在阻塞线程池中缩放并编码
///
/// # 参数
/// - `resize_policy`: 为 None 时保持原尺寸
/// - `quality`: 压缩质量
pub async fn reencode_blocking(
    codec: Arc<dyn Codec>,
    image: Arc<DynamicImage>,
    resize_policy: Option<ResizePolicy>,
    quality: f32,
) -> Result<Vec<u8>, ConversionError> {
    task::spawn_blocking(move || match resize_policy {
        Some(policy) => codec.encode(&codec.resize(&image, policy), quality),
        None => codec.encode(&image, quality),
    })
    .await
    .map_err(|e| ConversionError::ConversionFailed(format!("任务执行失败: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 创建测试用的 PNG 数据
    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([255, 0, 0]),
        ));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    /// 创建测试用的 JPEG 数据
    fn create_test_jpeg() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            4,
            4,
            image::Rgb([0, 0, 255]),
        ));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    #[test]
    fn test_decode_png_and_jpeg() {
        let codec = WebPCodec;

        let png = codec.decode(&create_test_png(3, 2)).unwrap();
        assert_eq!(png.dimensions(), (3, 2));

        let jpeg = codec.decode(&create_test_jpeg()).unwrap();
        assert_eq!(jpeg.dimensions(), (4, 4));
    }

    #[test]
    fn test_decode_invalid_data() {
        let codec = WebPCodec;

        let result = codec.decode(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(ConversionError::DecodeFailed(_))));

        assert!(codec.decode(&[]).is_err());
    }

    #[test]
    fn test_decode_corrupted_png() {
        // PNG 签名正确，但数据损坏
        let corrupted = vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A,
            0x00, 0x00, 0x00, 0x00,
        ];
        assert!(WebPCodec.decode(&corrupted).is_err());
    }

    #[test]
    fn test_lossless_encode_roundtrip() {
        let codec = WebPCodec;
        let original = codec.decode(&create_test_png(8, 6)).unwrap();

        let webp_data = codec.encode(&original, 1.0).unwrap();
        // 验证 WebP 魔数（RIFF...WEBP）
        assert_eq!(&webp_data[0..4], b"RIFF");
        assert_eq!(&webp_data[8..12], b"WEBP");

        let decoded = codec.decode(&webp_data).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.to_rgba8(), original.to_rgba8());
    }

    #[test]
    fn test_lossy_encode() {
        let codec = WebPCodec;
        let original = codec.decode(&create_test_png(16, 16)).unwrap();

        let webp_data = codec.encode(&original, 0.5).unwrap();
        assert_eq!(&webp_data[8..12], b"WEBP");
        assert_eq!(codec.decode(&webp_data).unwrap().dimensions(), (16, 16));
    }

    #[test]
    fn test_resize_preserves_aspect() {
        let codec = WebPCodec;
        let original = codec.decode(&create_test_png(256, 100)).unwrap();

        let by_width = codec.resize(&original, ResizePolicy::Width(128));
        assert_eq!(by_width.dimensions(), (128, 50));

        let by_height = codec.resize(&original, ResizePolicy::Height(50));
        assert_eq!(by_height.dimensions(), (128, 50));
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let codec: Arc<dyn Codec> = Arc::new(WebPCodec);
        let bytes: Arc<[u8]> = create_test_png(40, 20).into();

        let image = decode_blocking(Arc::clone(&codec), bytes).await.unwrap();
        let encoded = reencode_blocking(
            Arc::clone(&codec),
            Arc::new(image),
            Some(ResizePolicy::Width(10)),
            0.8,
        )
        .await
        .unwrap();

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (10, 5));
    }
}
