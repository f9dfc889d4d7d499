use image::{Rgb, RgbImage};

use crate::core::quality::reflect101;

/// Bilinear sample at a fractional source position with reflect-101 borders.
pub fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    if !x.is_finite() || !y.is_finite() {
        return *src.get_pixel(0, 0);
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let px = |xi: i64, yi: i64| {
        let sx = reflect101(xi, w) as u32;
        let sy = reflect101(yi, h) as u32;
        src.get_pixel(sx, sy).0
    };

    let p00 = px(x0, y0);
    let p10 = px(x0 + 1, y0);
    let p01 = px(x0, y0 + 1);
    let p11 = px(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Build a same-size image whose pixel `(x, y)` is read from `map(x, y)`
/// in the source.
pub fn remap<F>(src: &RgbImage, map: F) -> RgbImage
where
    F: Fn(f32, f32) -> (f32, f32),
{
    RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let (sx, sy) = map(x as f32, y as f32);
        sample_bilinear(src, sx, sy)
    })
}

/// Rotate by `angle_deg` (counter-clockwise), scale and translate around the
/// image center, keeping the canvas size.
pub fn affine(src: &RgbImage, angle_deg: f32, scale: f32, dx: f32, dy: f32) -> RgbImage {
    let cx = (src.width() as f32 - 1.0) / 2.0;
    let cy = (src.height() as f32 - 1.0) / 2.0;
    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    let inv_scale = if scale.abs() > f32::EPSILON { 1.0 / scale } else { 1.0 };

    // Inverse mapping: destination -> source
    remap(src, |x, y| {
        let tx = x - cx - dx;
        let ty = y - cy - dy;
        let sx = (cos * tx - sin * ty) * inv_scale + cx;
        let sy = (sin * tx + cos * ty) * inv_scale + cy;
        (sx, sy)
    })
}

/// 1-D Gaussian smoothing of a row-major `width`x`height` field along both
/// axes, reflect-101 at the edges.
pub fn gaussian_smooth(field: &[f32], width: usize, height: usize, sigma: f32) -> Vec<f32> {
    let radius = ((3.0 * sigma).ceil() as usize).max(1);
    let kernel: Vec<f32> = {
        let raw: Vec<f32> = (0..=2 * radius)
            .map(|i| {
                let d = i as f32 - radius as f32;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let sum: f32 = raw.iter().sum();
        raw.into_iter().map(|k| k / sum).collect()
    };

    let mut horizontal = vec![0.0; field.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (i, k) in kernel.iter().enumerate() {
                let sx = reflect101(x as i64 + i as i64 - radius as i64, width as i64) as usize;
                acc += k * field[y * width + sx];
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut out = vec![0.0; field.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (i, k) in kernel.iter().enumerate() {
                let sy = reflect101(y as i64 + i as i64 - radius as i64, height as i64) as usize;
                acc += k * horizontal[sy * width + x];
            }
            out[y * width + x] = acc;
        }
    }
    out
}
