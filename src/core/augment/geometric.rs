use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;

use super::engine::TransformError;
use super::sampling::{symmetric, uniform};
use super::warp::affine;

const CROP_ATTEMPTS: usize = 10;

/// Crop a random area/aspect window and resize it to `width`x`height`.
///
/// Falls back to a center crop clamped to the ratio range when no random
/// window fits after a few draws.
pub fn random_resized_crop<R: Rng + ?Sized>(
    img: &RgbImage,
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(TransformError::EmptyImage("random_resized_crop"));
    }
    if width == 0 || height == 0 || ratio.0 <= 0.0 || ratio.1 < ratio.0 {
        return Err(TransformError::InvalidParameter {
            transform: "random_resized_crop",
            message: format!("size {}x{}, ratio {:?}", width, height, ratio),
        });
    }

    let area = src_w as f32 * src_h as f32;
    let (log_lo, log_hi) = (ratio.0.ln(), ratio.1.ln());

    let mut window = None;
    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * uniform(rng, scale.0, scale.1);
        let aspect = uniform(rng, log_lo, log_hi).exp();
        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;
        if w > 0 && h > 0 && w <= src_w && h <= src_h {
            let x = rng.gen_range(0..=src_w - w);
            let y = rng.gen_range(0..=src_h - h);
            window = Some((x, y, w, h));
            break;
        }
    }

    let (x, y, w, h) = window.unwrap_or_else(|| {
        let in_ratio = src_w as f32 / src_h as f32;
        let (w, h) = if in_ratio < ratio.0 {
            (src_w, ((src_w as f32 / ratio.0).round() as u32).clamp(1, src_h))
        } else if in_ratio > ratio.1 {
            (((src_h as f32 * ratio.1).round() as u32).clamp(1, src_w), src_h)
        } else {
            (src_w, src_h)
        };
        ((src_w - w) / 2, (src_h - h) / 2, w, h)
    });

    let cropped = imageops::crop_imm(img, x, y, w, h).to_image();
    Ok(imageops::resize(&cropped, width, height, FilterType::Triangle))
}

pub fn horizontal_flip(img: &RgbImage) -> RgbImage {
    imageops::flip_horizontal(img)
}

pub fn vertical_flip(img: &RgbImage) -> RgbImage {
    imageops::flip_vertical(img)
}

/// Rotate by a random multiple of 90 degrees.
///
/// Non-square images only turn by 0 or 180 degrees so their size holds.
pub fn random_rotate90<R: Rng + ?Sized>(img: &RgbImage, rng: &mut R) -> RgbImage {
    let square = img.width() == img.height();
    let quarter_turns = if square {
        rng.gen_range(0..4)
    } else {
        rng.gen_range(0..2) * 2
    };
    match quarter_turns {
        1 => imageops::rotate90(img),
        2 => imageops::rotate180(img),
        3 => imageops::rotate270(img),
        _ => img.clone(),
    }
}

pub fn rotate<R: Rng + ?Sized>(img: &RgbImage, limit: f32, rng: &mut R) -> RgbImage {
    let angle = symmetric(rng, limit);
    affine(img, angle, 1.0, 0.0, 0.0)
}

/// Random translation (fraction of the size), zoom and rotation in one warp.
pub fn shift_scale_rotate<R: Rng + ?Sized>(
    img: &RgbImage,
    shift_limit: f32,
    scale_limit: f32,
    rotate_limit: f32,
    rng: &mut R,
) -> RgbImage {
    let angle = symmetric(rng, rotate_limit);
    let scale = 1.0 + symmetric(rng, scale_limit);
    let dx = symmetric(rng, shift_limit) * img.width() as f32;
    let dy = symmetric(rng, shift_limit) * img.height() as f32;
    affine(img, angle, scale, dx, dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn test_random_resized_crop_sets_target_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let img = sample(300, 180);
        for _ in 0..10 {
            let out =
                random_resized_crop(&img, 64, 48, (0.8, 1.0), (0.75, 1.33), &mut rng).unwrap();
            assert_eq!(out.dimensions(), (64, 48));
        }
    }

    #[test]
    fn test_random_resized_crop_falls_back_on_extreme_ratio() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let img = sample(400, 20);
        let out = random_resized_crop(&img, 32, 32, (1.0, 1.0), (1.0, 1.0), &mut rng).unwrap();
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_rotate90_keeps_non_square_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let img = sample(40, 20);
        for _ in 0..20 {
            assert_eq!(random_rotate90(&img, &mut rng).dimensions(), (40, 20));
        }
    }

    #[test]
    fn test_flips_are_involutions() {
        let img = sample(17, 9);
        assert_eq!(horizontal_flip(&horizontal_flip(&img)), img);
        assert_eq!(vertical_flip(&vertical_flip(&img)), img);
        assert_ne!(horizontal_flip(&img), img);
    }

    #[test]
    fn test_warps_preserve_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let img = sample(50, 30);
        assert_eq!(rotate(&img, 30.0, &mut rng).dimensions(), (50, 30));
        assert_eq!(
            shift_scale_rotate(&img, 0.1, 0.2, 30.0, &mut rng).dimensions(),
            (50, 30)
        );
    }
}
