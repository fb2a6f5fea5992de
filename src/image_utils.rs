use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::{otsu_level, threshold};
use serde::{Deserialize, Serialize};

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);
pub const DARK_GREEN: Rgb<u8> = Rgb([0, 127, 0]);
pub const DARK_BLUE: Rgb<u8> = Rgb([0, 0, 127]);
pub const DARK_RED: Rgb<u8> = Rgb([127, 0, 0]);

/// Inputs whose darkest and lightest pixels differ by less than this carry
/// no ink worth binarizing.
pub const MIN_BINARIZE_CONTRAST: u8 = 32;

/// Dimensions of a rectangular structuring element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSize {
    pub width: u32,
    pub height: u32,
}

impl KernelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MorphOp {
    Erode,
    Dilate,
}

/// Converts an RGB raster to luma using the `image` crate's weights.
pub fn grayscale(img: &RgbImage) -> GrayImage {
    imageops::grayscale(img)
}

/// Resizes an image to exactly the given canvas size.
pub fn size_image_to_fit(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(img, width, height, imageops::FilterType::Triangle)
}

/// Inverts a grayscale image and binarizes it with Otsu's threshold, so dark
/// ink on light paper becomes white foreground on black.
///
/// Images without meaningful contrast produce an all-black mask.
pub fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max.saturating_sub(min) < MIN_BINARIZE_CONTRAST {
        return GrayImage::from_pixel(gray.width(), gray.height(), BLACK);
    }

    let mut inverted = gray.clone();
    imageops::invert(&mut inverted);
    threshold(&inverted, otsu_level(&inverted))
}

/// Determines the number of pixels in an image that match the given luma.
pub fn count_pixels(img: &GrayImage, luma: &Luma<u8>) -> u32 {
    img.pixels().filter(|p| *p == luma).count() as u32
}

/// Binary erosion with a `kernel.width` × `kernel.height` rectangle.
/// Pixels outside the image do not constrain the result.
pub fn erode_rect(img: &GrayImage, kernel: KernelSize) -> GrayImage {
    filter_columns(&filter_rows(img, kernel.width, MorphOp::Erode), kernel.height, MorphOp::Erode)
}

/// Binary dilation with a `kernel.width` × `kernel.height` rectangle.
pub fn dilate_rect(img: &GrayImage, kernel: KernelSize) -> GrayImage {
    filter_columns(&filter_rows(img, kernel.width, MorphOp::Dilate), kernel.height, MorphOp::Dilate)
}

/// Erosion followed by dilation: removes foreground shapes the kernel does
/// not fit inside.
pub fn open_rect(img: &GrayImage, kernel: KernelSize) -> GrayImage {
    dilate_rect(&erode_rect(img, kernel), kernel)
}

/// Dilation followed by erosion: fills gaps narrower than the kernel.
pub fn close_rect(img: &GrayImage, kernel: KernelSize) -> GrayImage {
    erode_rect(&dilate_rect(img, kernel), kernel)
}

/// Window of `len` pixels around `i` with the anchor at `len / 2`, clipped to
/// `[0, limit)`. Dilation uses the reflected window so that opening restores
/// every run the kernel fits inside.
fn window(i: u32, len: u32, limit: u32, op: MorphOp) -> std::ops::RangeInclusive<u32> {
    let (before, after) = match op {
        MorphOp::Erode => (len / 2, len - 1 - len / 2),
        MorphOp::Dilate => (len - 1 - len / 2, len / 2),
    };
    i.saturating_sub(before)..=(i + after).min(limit - 1)
}

fn apply(op: MorphOp, mut values: impl Iterator<Item = bool>) -> Luma<u8> {
    let hit = match op {
        MorphOp::Erode => values.all(|v| v),
        MorphOp::Dilate => values.any(|v| v),
    };
    if hit {
        WHITE
    } else {
        BLACK
    }
}

fn filter_rows(img: &GrayImage, len: u32, op: MorphOp) -> GrayImage {
    if len <= 1 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        apply(op, window(x, len, width, op).map(|i| img.get_pixel(i, y).0[0] > 0))
    })
}

fn filter_columns(img: &GrayImage, len: u32, op: MorphOp) -> GrayImage {
    if len <= 1 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        apply(op, window(y, len, height, op).map(|i| img.get_pixel(x, i).0[0] > 0))
    })
}
