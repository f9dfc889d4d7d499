use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::Result;

/// Encoding used for every image the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpeg")]
    Jpg,
    Png,
    Bmp,
    #[serde(alias = "tif")]
    Tiff,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
        }
    }
}

/// Encode `img` in `format`. `quality` (1-100) only affects JPEG.
pub fn encode_image(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());

    match format {
        OutputFormat::Jpg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => img.write_to(&mut buf, ImageFormat::Png)?,
        OutputFormat::Bmp => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, ImageFormat::Bmp)?,
        OutputFormat::Tiff => img.write_to(&mut buf, ImageFormat::Tiff)?,
    }

    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(20, 10, |x, y| {
            Rgb([(x * 10) as u8, (y * 20) as u8, 50])
        }))
    }

    #[test]
    fn test_every_format_decodes_back() {
        for format in [
            OutputFormat::Jpg,
            OutputFormat::Png,
            OutputFormat::Bmp,
            OutputFormat::Tiff,
        ] {
            let bytes = encode_image(&sample(), format, 90).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (20, 10), "{:?}", format);
        }
    }

    #[test]
    fn test_jpeg_quality_changes_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Rgb([((x * y) % 256) as u8, (x * 3 % 256) as u8, (y * 5 % 256) as u8])
        }));
        let small = encode_image(&img, OutputFormat::Jpg, 10).unwrap();
        let large = encode_image(&img, OutputFormat::Jpg, 95).unwrap();
        assert!(small.len() < large.len());
    }

    #[test]
    fn test_format_names() {
        let f: OutputFormat = serde_json::from_str("\"jpeg\"").unwrap();
        assert_eq!(f, OutputFormat::Jpg);
        assert_eq!(OutputFormat::Tiff.extension(), "tiff");
        assert!(serde_json::from_str::<OutputFormat>("\"gif\"").is_err());
    }
}
