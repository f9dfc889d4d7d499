use image::{Rgb, RgbImage};
use palette::{FromColor, Hsv, Lab, Srgb};
use rand::Rng;

use super::engine::TransformError;
use super::sampling::symmetric;

fn to_srgb(pixel: &Rgb<u8>) -> Srgb {
    Srgb::new(
        pixel[0] as f32 / 255.0,
        pixel[1] as f32 / 255.0,
        pixel[2] as f32 / 255.0,
    )
}

fn from_srgb(rgb: Srgb) -> Rgb<u8> {
    let r = (rgb.red * 255.0).round().clamp(0.0, 255.0) as u8;
    let g = (rgb.green * 255.0).round().clamp(0.0, 255.0) as u8;
    let b = (rgb.blue * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([r, g, b])
}

/// `out = in * alpha + beta`, with `alpha = 1 ± contrast_limit` and
/// `beta = ±brightness_limit` of full scale.
pub fn brightness_contrast<R: Rng + ?Sized>(
    img: &RgbImage,
    brightness_limit: f32,
    contrast_limit: f32,
    rng: &mut R,
) -> RgbImage {
    let alpha = 1.0 + symmetric(rng, contrast_limit);
    let beta = symmetric(rng, brightness_limit) * 255.0;

    let lut: Vec<u8> = (0..256)
        .map(|v| (v as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8)
        .collect();

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = lut[*c as usize];
        }
    }
    out
}

/// Shift hue, saturation and value by random amounts in HSV space.
pub fn hue_saturation_value<R: Rng + ?Sized>(
    img: &RgbImage,
    hue_shift_limit: f32,
    sat_shift_limit: f32,
    val_shift_limit: f32,
    rng: &mut R,
) -> RgbImage {
    // Limits are in OpenCV 8-bit units: hue in half degrees, s/v over 255
    let hue_shift = symmetric(rng, hue_shift_limit) * 2.0;
    let sat_shift = symmetric(rng, sat_shift_limit) / 255.0;
    let val_shift = symmetric(rng, val_shift_limit) / 255.0;

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let mut hsv: Hsv = Hsv::from_color(to_srgb(pixel));
        hsv.hue = hsv.hue + hue_shift;
        hsv.saturation = (hsv.saturation + sat_shift).clamp(0.0, 1.0);
        hsv.value = (hsv.value + val_shift).clamp(0.0, 1.0);
        *pixel = from_srgb(Srgb::from_color(hsv));
    }
    out
}

/// Contrast-limited adaptive histogram equalization on the Lab lightness
/// channel.
pub fn clahe(
    img: &RgbImage,
    clip_limit: f32,
    tile_grid: (u32, u32),
) -> Result<RgbImage, TransformError> {
    let (width, height) = img.dimensions();
    let (grid_x, grid_y) = tile_grid;
    if grid_x == 0 || grid_y == 0 {
        return Err(TransformError::InvalidParameter {
            transform: "clahe",
            message: "tile grid must be non-zero".to_string(),
        });
    }
    if width < grid_x || height < grid_y {
        return Err(TransformError::ImageTooSmall {
            transform: "clahe",
            width,
            height,
            min_width: grid_x,
            min_height: grid_y,
        });
    }

    let labs: Vec<Lab> = img.pixels().map(|p| Lab::from_color(to_srgb(p))).collect();
    let lightness: Vec<u8> = labs
        .iter()
        .map(|lab| (lab.l * 2.55).round().clamp(0.0, 255.0) as u8)
        .collect();

    let tile_bounds = |idx: u32, grid: u32, len: u32| {
        let start = idx * len / grid;
        let end = (idx + 1) * len / grid;
        (start, end)
    };

    // One lookup table per tile
    let mut luts = vec![[0u8; 256]; (grid_x * grid_y) as usize];
    for ty in 0..grid_y {
        let (y0, y1) = tile_bounds(ty, grid_y, height);
        for tx in 0..grid_x {
            let (x0, x1) = tile_bounds(tx, grid_x, width);
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[lightness[(y * width + x) as usize] as usize] += 1;
                }
            }
            let tile_area = ((x1 - x0) * (y1 - y0)).max(1);
            let limit = ((clip_limit * tile_area as f32 / 256.0) as u32).max(1);

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let spread = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += spread + u32::from(i < remainder);
            }

            let lut = &mut luts[(ty * grid_x + tx) as usize];
            let mut cdf = 0u32;
            for (i, count) in hist.iter().enumerate() {
                cdf += count;
                lut[i] = ((cdf as f32 * 255.0 / tile_area as f32).round()).clamp(0.0, 255.0) as u8;
            }
        }
    }

    let tile_w = width as f32 / grid_x as f32;
    let tile_h = height as f32 / grid_y as f32;
    let neighbours = |pos: f32, tile: f32, grid: u32| {
        let f = (pos + 0.5) / tile - 0.5;
        let lo = f.floor().clamp(0.0, (grid - 1) as f32);
        let hi = (lo + 1.0).min((grid - 1) as f32);
        let weight = (f - lo).clamp(0.0, 1.0);
        (lo as u32, hi as u32, weight)
    };

    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) = neighbours(y as f32, tile_h, grid_y);
        for x in 0..width {
            let (tx0, tx1, wx) = neighbours(x as f32, tile_w, grid_x);
            let idx = (y * width + x) as usize;
            let v = lightness[idx] as usize;
            let at = |tx: u32, ty: u32| luts[(ty * grid_x + tx) as usize][v] as f32;

            let top = at(tx0, ty0) * (1.0 - wx) + at(tx1, ty0) * wx;
            let bottom = at(tx0, ty1) * (1.0 - wx) + at(tx1, ty1) * wx;
            let equalized = top * (1.0 - wy) + bottom * wy;

            let mut lab = labs[idx];
            lab.l = equalized / 2.55;
            out.put_pixel(x, y, from_srgb(Srgb::from_color(lab)));
        }
    }

    Ok(out)
}
