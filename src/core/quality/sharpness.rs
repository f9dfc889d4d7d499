use image::{DynamicImage, GrayImage};

/// 3x3 Laplacian aperture: `[0 1 0; 1 -4 1; 0 1 0]`
const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Reflect an out-of-range coordinate back into `0..len` without repeating
/// the edge pixel (`gfedcb|abcdefgh|gfedcba`).
pub fn reflect101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i.rem_euclid(period);
    if m < len {
        m
    } else {
        period - m
    }
}

/// Variance of the Laplacian response of an image's grayscale reduction.
///
/// Sharp images have strong edges and therefore a high variance; blurred
/// images score low. The value is on the 0-255 intensity scale, so a
/// threshold of 50-100 is a typical cut-off.
pub fn laplacian_variance(img: &DynamicImage) -> f64 {
    laplacian_variance_gray(&img.to_luma8())
}

pub fn laplacian_variance_gray(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as i64, height as i64);
    let count = (width as u64 * height as u64) as f64;
    if count == 0.0 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;

    for y in 0..h {
        for x in 0..w {
            let mut response = 0.0;
            for (ky, row) in LAPLACIAN.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    if k == 0.0 {
                        continue;
                    }
                    let sx = reflect101(x + kx as i64 - 1, w);
                    let sy = reflect101(y + ky as i64 - 1, h);
                    response += k * gray.get_pixel(sx as u32, sy as u32)[0] as f64;
                }
            }
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(0, 5), 0);
        assert_eq!(reflect101(4, 5), 4);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 1), 0);
    }

    #[test]
    fn test_flat_image_has_zero_variance() {
        let gray = GrayImage::from_pixel(32, 32, Luma([128]));
        assert_eq!(laplacian_variance_gray(&gray), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharper_than_gradient() {
        let checker = GrayImage::from_fn(32, 32, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let gradient = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));

        let sharp = laplacian_variance_gray(&checker);
        let smooth = laplacian_variance_gray(&gradient);
        assert!(sharp > 1000.0);
        assert!(smooth < sharp);
    }
}
