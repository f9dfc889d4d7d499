use image::imageops;
use image::{Rgb, RgbImage};
use palette::{FromColor, Hsl, Srgb};
use rand::Rng;

use super::engine::TransformError;
use super::sampling::{odd_kernel_size, standard_normal, symmetric, uniform};
use super::warp::{gaussian_smooth, remap};

fn clamp_coord(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}

fn no_kernel(transform: &'static str, lo: u32, hi: u32) -> TransformError {
    TransformError::InvalidParameter {
        transform,
        message: format!("no odd kernel size in [{}, {}]", lo, hi),
    }
}

/// Gaussian blur with an odd kernel size drawn from `blur_limit`.
///
/// Sigma follows the usual kernel-size rule of thumb
/// `0.3 * ((k - 1) / 2 - 1) + 0.8`; a size of 1 leaves the image unchanged.
pub fn gaussian_blur<R: Rng + ?Sized>(
    img: &RgbImage,
    blur_limit: (u32, u32),
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let ksize = odd_kernel_size(rng, blur_limit.0, blur_limit.1)
        .ok_or_else(|| no_kernel("gaussian_blur", blur_limit.0, blur_limit.1))?;
    if ksize <= 1 {
        return Ok(img.clone());
    }
    let sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    Ok(imageops::blur(img, sigma))
}

/// Average along a random straight line through each pixel.
pub fn motion_blur<R: Rng + ?Sized>(
    img: &RgbImage,
    blur_limit: u32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let ksize =
        odd_kernel_size(rng, 3, blur_limit).ok_or_else(|| no_kernel("motion_blur", 3, blur_limit))?;
    let angle = rng.gen_range(0.0..std::f32::consts::PI);
    let (sin, cos) = angle.sin_cos();
    let half = (ksize / 2) as i64;

    let mut offsets: Vec<(i64, i64)> = (-half..=half)
        .map(|t| {
            (
                (t as f32 * cos).round() as i64,
                (t as f32 * sin).round() as i64,
            )
        })
        .collect();
    offsets.dedup();

    let (w, h) = img.dimensions();
    Ok(RgbImage::from_fn(w, h, |x, y| {
        let mut acc = [0u32; 3];
        for (dx, dy) in &offsets {
            let p = img.get_pixel(
                clamp_coord(x as i64 + dx, w),
                clamp_coord(y as i64 + dy, h),
            );
            for c in 0..3 {
                acc[c] += p[c] as u32;
            }
        }
        let n = offsets.len() as u32;
        Rgb([
            ((acc[0] + n / 2) / n) as u8,
            ((acc[1] + n / 2) / n) as u8,
            ((acc[2] + n / 2) / n) as u8,
        ])
    }))
}

/// Per-channel median over a square window.
pub fn median_blur<R: Rng + ?Sized>(
    img: &RgbImage,
    blur_limit: u32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let ksize =
        odd_kernel_size(rng, 3, blur_limit).ok_or_else(|| no_kernel("median_blur", 3, blur_limit))?;
    let half = (ksize / 2) as i64;
    let (w, h) = img.dimensions();

    let mut window: Vec<u8> = Vec::with_capacity((ksize * ksize) as usize);
    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut pixel = [0u8; 3];
            for (c, value) in pixel.iter_mut().enumerate() {
                window.clear();
                for dy in -half..=half {
                    for dx in -half..=half {
                        let p = img.get_pixel(
                            clamp_coord(x as i64 + dx, w),
                            clamp_coord(y as i64 + dy, h),
                        );
                        window.push(p[c]);
                    }
                }
                window.sort_unstable();
                *value = window[window.len() / 2];
            }
            out.put_pixel(x, y, Rgb(pixel));
        }
    }
    Ok(out)
}

/// Additive zero-mean Gaussian noise, independent per channel.
pub fn gauss_noise<R: Rng + ?Sized>(img: &RgbImage, var_limit: (f32, f32), rng: &mut R) -> RgbImage {
    let sigma = uniform(rng, var_limit.0, var_limit.1).max(0.0).sqrt();
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            let noisy = *c as f32 + standard_normal(rng) * sigma;
            *c = noisy.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Camera sensor noise: hue jitter plus lightness noise scaled by the
/// image's own lightness spread.
pub fn iso_noise<R: Rng + ?Sized>(
    img: &RgbImage,
    color_shift: (f32, f32),
    intensity: (f32, f32),
    rng: &mut R,
) -> RgbImage {
    let color_shift = uniform(rng, color_shift.0, color_shift.1);
    let intensity = uniform(rng, intensity.0, intensity.1);

    let hsls: Vec<Hsl> = img
        .pixels()
        .map(|p| {
            Hsl::from_color(Srgb::new(
                p[0] as f32 / 255.0,
                p[1] as f32 / 255.0,
                p[2] as f32 / 255.0,
            ))
        })
        .collect();

    let n = hsls.len().max(1) as f32;
    let mean = hsls.iter().map(|c| c.lightness).sum::<f32>() / n;
    let std = (hsls.iter().map(|c| (c.lightness - mean).powi(2)).sum::<f32>() / n).sqrt();

    let mut out = img.clone();
    for (pixel, mut hsl) in out.pixels_mut().zip(hsls) {
        hsl.hue = hsl.hue + standard_normal(rng) * color_shift * 360.0;
        hsl.lightness = (hsl.lightness + standard_normal(rng) * intensity * std).clamp(0.0, 1.0);
        let rgb: Srgb = Srgb::from_color(hsl);
        *pixel = Rgb([
            (rgb.red * 255.0).round().clamp(0.0, 255.0) as u8,
            (rgb.green * 255.0).round().clamp(0.0, 255.0) as u8,
            (rgb.blue * 255.0).round().clamp(0.0, 255.0) as u8,
        ]);
    }
    out
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    for yy in y..(y + h).min(img.height()) {
        for xx in x..(x + w).min(img.width()) {
            img.put_pixel(xx, yy, Rgb([0, 0, 0]));
        }
    }
}

/// Black out between 1 and `max_holes` rectangles of random size.
pub fn coarse_dropout<R: Rng + ?Sized>(
    img: &RgbImage,
    max_holes: u32,
    max_height: u32,
    max_width: u32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    if max_holes == 0 || max_height == 0 || max_width == 0 {
        return Err(TransformError::InvalidParameter {
            transform: "coarse_dropout",
            message: "holes and hole sizes must be non-zero".to_string(),
        });
    }
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(TransformError::EmptyImage("coarse_dropout"));
    }

    let mut out = img.clone();
    let holes = rng.gen_range(1..=max_holes);
    for _ in 0..holes {
        let hole_h = rng.gen_range(1..=max_height.min(h));
        let hole_w = rng.gen_range(1..=max_width.min(w));
        let y = rng.gen_range(0..=h - hole_h);
        let x = rng.gen_range(0..=w - hole_w);
        fill_rect(&mut out, x, y, hole_w, hole_h);
    }
    Ok(out)
}

/// Black out exactly `num_holes` squares of fixed size.
pub fn cutout<R: Rng + ?Sized>(
    img: &RgbImage,
    num_holes: u32,
    max_h_size: u32,
    max_w_size: u32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(TransformError::EmptyImage("cutout"));
    }
    let hole_h = max_h_size.min(h);
    let hole_w = max_w_size.min(w);

    let mut out = img.clone();
    for _ in 0..num_holes {
        let y = rng.gen_range(0..=h - hole_h);
        let x = rng.gen_range(0..=w - hole_w);
        fill_rect(&mut out, x, y, hole_w, hole_h);
    }
    Ok(out)
}

/// Source coordinate for every output coordinate along one axis, with the
/// axis cut into `num_steps` cells each stretched by `1 ± distort_limit`.
fn grid_axis<R: Rng + ?Sized>(len: u32, num_steps: u32, distort_limit: f32, rng: &mut R) -> Vec<f32> {
    let step = len as f32 / num_steps as f32;
    let stretches: Vec<f32> = (0..num_steps)
        .map(|_| 1.0 + symmetric(rng, distort_limit))
        .collect();
    let total: f32 = stretches.iter().sum();

    // Normalize so the warped axis still spans the full length
    let mut coords = Vec::with_capacity(len as usize);
    let mut prev = 0.0;
    for (i, stretch) in stretches.iter().enumerate() {
        let start = (i as f32 * step).round() as u32;
        let end = if i as u32 + 1 == num_steps {
            len
        } else {
            ((i as f32 + 1.0) * step).round() as u32
        };
        let next = prev + len as f32 * stretch / total;
        let cells = (end - start).max(1) as f32;
        for j in start..end {
            let t = (j - start) as f32 / cells;
            coords.push(prev + (next - prev) * t);
        }
        prev = next;
    }
    coords
}

pub fn grid_distortion<R: Rng + ?Sized>(
    img: &RgbImage,
    num_steps: u32,
    distort_limit: f32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let (w, h) = img.dimensions();
    if num_steps == 0 || num_steps > w.min(h) {
        return Err(TransformError::ImageTooSmall {
            transform: "grid_distortion",
            width: w,
            height: h,
            min_width: num_steps.max(1),
            min_height: num_steps.max(1),
        });
    }
    let xs = grid_axis(w, num_steps, distort_limit, rng);
    let ys = grid_axis(h, num_steps, distort_limit, rng);
    Ok(remap(img, |x, y| (xs[x as usize], ys[y as usize])))
}

/// Displace pixels along a smoothed random field.
pub fn elastic_transform<R: Rng + ?Sized>(
    img: &RgbImage,
    alpha: f32,
    sigma: f32,
    rng: &mut R,
) -> Result<RgbImage, TransformError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(TransformError::EmptyImage("elastic_transform"));
    }
    let (width, height) = (w as usize, h as usize);
    let field = |rng: &mut R| {
        let raw: Vec<f32> = (0..width * height).map(|_| symmetric(rng, 1.0)).collect();
        gaussian_smooth(&raw, width, height, sigma)
    };
    let dx = field(&mut *rng);
    let dy = field(&mut *rng);

    Ok(remap(img, |x, y| {
        let idx = y as usize * width + x as usize;
        (x + dx[idx] * alpha, y + dy[idx] * alpha)
    }))
}

/// Barrel/pincushion distortion around a slightly shifted center.
pub fn optical_distortion<R: Rng + ?Sized>(
    img: &RgbImage,
    distort_limit: f32,
    shift_limit: f32,
    rng: &mut R,
) -> RgbImage {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let k = symmetric(rng, distort_limit);
    let cx = w * 0.5 + symmetric(rng, shift_limit) * w;
    let cy = h * 0.5 + symmetric(rng, shift_limit) * h;
    let focal = w.max(1.0);

    remap(img, |x, y| {
        let nx = (x - cx) / focal;
        let ny = (y - cy) / focal;
        let factor = 1.0 + k * (nx * nx + ny * ny);
        (nx * factor * focal + cx, ny * factor * focal + cy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn stripes(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if x % 4 < 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn black_count(img: &RgbImage) -> usize {
        img.pixels().filter(|p| p.0 == [0, 0, 0]).count()
    }

    #[test]
    fn test_blurs_preserve_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let img = stripes(40, 24);
        assert_eq!(gaussian_blur(&img, (3, 3), &mut rng).unwrap().dimensions(), (40, 24));
        assert_eq!(motion_blur(&img, 3, &mut rng).unwrap().dimensions(), (40, 24));
        assert_eq!(median_blur(&img, 3, &mut rng).unwrap().dimensions(), (40, 24));
    }

    #[test]
    fn test_median_removes_single_speck() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut img = RgbImage::from_pixel(9, 9, Rgb([10, 10, 10]));
        img.put_pixel(4, 4, Rgb([250, 250, 250]));
        let out = median_blur(&img, 3, &mut rng).unwrap();
        assert_eq!(out.get_pixel(4, 4).0, [10, 10, 10]);
    }

    #[test]
    fn test_blur_kernel_unavailable_is_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let img = stripes(8, 8);
        assert!(gaussian_blur(&img, (2, 2), &mut rng).is_err());
        assert!(motion_blur(&img, 2, &mut rng).is_err());
    }

    #[test]
    fn test_noise_changes_pixels_but_not_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let img = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let noisy = gauss_noise(&img, (10.0, 50.0), &mut rng);
        assert_eq!(noisy.dimensions(), img.dimensions());
        assert_ne!(noisy, img);
        let iso = iso_noise(&stripes(32, 32), (0.01, 0.05), (0.1, 0.5), &mut rng);
        assert_eq!(iso.dimensions(), (32, 32));
    }

    #[test]
    fn test_cutout_blacks_out_area() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let img = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
        let out = cutout(&img, 2, 8, 8, &mut rng).unwrap();
        let blacked = black_count(&out);
        assert!(blacked >= 64 && blacked <= 128);

        let dropped = coarse_dropout(&img, 4, 16, 16, &mut rng).unwrap();
        assert!(black_count(&dropped) > 0);
    }

    #[test]
    fn test_grid_axis_is_monotonic_and_full_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let coords = grid_axis(100, 5, 0.3, &mut rng);
        assert_eq!(coords.len(), 100);
        assert!(coords.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(coords[0], 0.0);
        assert!(*coords.last().unwrap() < 100.0);
    }

    #[test]
    fn test_distortions_preserve_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let img = stripes(48, 32);
        assert_eq!(grid_distortion(&img, 5, 0.3, &mut rng).unwrap().dimensions(), (48, 32));
        assert_eq!(elastic_transform(&img, 1.0, 4.0, &mut rng).unwrap().dimensions(), (48, 32));
        assert_eq!(optical_distortion(&img, 0.05, 0.05, &mut rng).dimensions(), (48, 32));
        assert!(grid_distortion(&stripes(3, 3), 5, 0.3, &mut rng).is_err());
    }
}
