//! Battery gauge and label drawn onto preview frames.
//!
//! The overlay always goes onto a private copy; the frame read from the
//! shared region is never touched. The label uses a small built-in bitmap
//! font unless an outline font file is supplied.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use dronelink_frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::debug;

use crate::error::{Result, VideoError};

const GAUGE_X: i32 = 10;
const GAUGE_Y: i32 = 10;
const GAUGE_WIDTH: u32 = 100;
const GAUGE_HEIGHT: u32 = 14;

const LABEL_X: i32 = GAUGE_X;
const LABEL_Y: i32 = GAUGE_Y + GAUGE_HEIGHT as i32 + 4;
const LABEL_PAD: u32 = 2;

const OUTLINE: Rgb<u8> = Rgb([255, 255, 255]);
const CHARGE: Rgb<u8> = Rgb([0, 200, 0]);
const LOW_CHARGE: Rgb<u8> = Rgb([230, 160, 0]);
const UNKNOWN: Rgb<u8> = Rgb([200, 0, 0]);
const TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const BACKING: Rgb<u8> = Rgb([0, 0, 0]);

const LOW_THRESHOLD: u8 = 20;

/// Bitmap glyphs are 8x8 dots, one dot of spacing between characters.
const GLYPH_SIZE: u32 = 8;
const GLYPH_ADVANCE: u32 = GLYPH_SIZE + 1;
const BITMAP_SCALE: u32 = 2;

/// Default pixel height for outline fonts.
pub const DEFAULT_FONT_PX: f32 = 18.0;

/// Text shown next to the preview, e.g. `Battery: 87%` or `Battery: N/A`.
pub fn battery_label(battery: Option<u8>) -> String {
    match battery {
        Some(level) => format!("Battery: {level}%"),
        None => "Battery: N/A".to_string(),
    }
}

enum LabelFont {
    Bitmap { scale: u32 },
    Outline { font: FontVec, scale: PxScale },
}

/// Draws the battery gauge and its text label onto a copy of a frame.
pub struct Overlay {
    font: LabelFont,
}

impl Overlay {
    /// Overlay using the built-in bitmap font.
    pub fn new() -> Self {
        Self {
            font: LabelFont::Bitmap {
                scale: BITMAP_SCALE,
            },
        }
    }

    /// Overlay whose label is rendered with a TrueType/OpenType font at `px`
    /// pixels high.
    pub fn from_font_file(path: impl AsRef<Path>, px: f32) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| VideoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(data).map_err(|source| VideoError::Font {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), px, "overlay font loaded");
        Ok(Self {
            font: LabelFont::Outline {
                font,
                scale: PxScale::from(px),
            },
        })
    }

    /// Copy `frame` into an image and draw the gauge and label in the
    /// top-left corner.
    ///
    /// Returns `None` only if the frame's pixel buffer does not match its
    /// dimensions, which `Frame::new` already rules out.
    pub fn annotate(&self, frame: &Frame, battery: Option<u8>) -> Option<RgbImage> {
        let mut image =
            RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())?;
        draw_gauge(&mut image, battery);
        self.draw_label(&mut image, &battery_label(battery));
        Some(image)
    }

    /// Pixel size of `label` as this overlay renders it, padding excluded.
    pub fn label_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            LabelFont::Bitmap { scale } => {
                let chars = label.chars().count() as u32;
                if chars == 0 {
                    return (0, 0);
                }
                ((chars * GLYPH_ADVANCE - 1) * scale, GLYPH_SIZE * scale)
            }
            LabelFont::Outline { font, scale } => text_size(*scale, font, label),
        }
    }

    fn draw_label(&self, image: &mut RgbImage, label: &str) {
        let (width, height) = self.label_size(label);
        if width == 0 || height == 0 {
            return;
        }
        let backing = Rect::at(LABEL_X, LABEL_Y)
            .of_size(width + 2 * LABEL_PAD, height + 2 * LABEL_PAD);
        draw_filled_rect_mut(image, backing, BACKING);

        let x = LABEL_X + LABEL_PAD as i32;
        let y = LABEL_Y + LABEL_PAD as i32;
        match &self.font {
            LabelFont::Bitmap { scale } => draw_bitmap_text(image, x, y, *scale, label),
            LabelFont::Outline { font, scale } => {
                draw_text_mut(image, TEXT, x, y, *scale, font, label)
            }
        }
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_gauge(image: &mut RgbImage, battery: Option<u8>) {
    let outline = Rect::at(GAUGE_X, GAUGE_Y).of_size(GAUGE_WIDTH, GAUGE_HEIGHT);
    draw_hollow_rect_mut(image, outline, OUTLINE);

    let inner_width = GAUGE_WIDTH - 2;
    let inner_height = GAUGE_HEIGHT - 2;
    let (fill_width, color) = match battery {
        Some(level) => {
            let level = u32::from(level.min(100));
            let color = if level < u32::from(LOW_THRESHOLD) {
                LOW_CHARGE
            } else {
                CHARGE
            };
            (inner_width * level / 100, color)
        }
        None => (inner_height, UNKNOWN),
    };

    // Rect rejects zero-sized rectangles.
    if fill_width > 0 {
        let fill = Rect::at(GAUGE_X + 1, GAUGE_Y + 1).of_size(fill_width, inner_height);
        draw_filled_rect_mut(image, fill, color);
    }
}

fn draw_bitmap_text(image: &mut RgbImage, x: i32, y: i32, scale: u32, text: &str) {
    let advance = (GLYPH_ADVANCE * scale) as i32;
    let dot = scale as i32;
    for (i, ch) in text.chars().enumerate() {
        let origin = x + i as i32 * advance;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }
                let cell = Rect::at(origin + col as i32 * dot, y + row as i32 * dot)
                    .of_size(scale, scale);
                // Clipped to the image by imageproc.
                draw_filled_rect_mut(image, cell, TEXT);
            }
        }
    }
}

/// 8x8 glyph rows, most significant bit leftmost. Lower case is drawn as
/// upper case; characters the labels never use are blank.
fn glyph(ch: char) -> [u8; 8] {
    match ch.to_ascii_uppercase() {
        '%' => [0x62, 0x64, 0x08, 0x10, 0x26, 0x46, 0x00, 0x00],
        '/' => [0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x00],
        '0' => [0x7C, 0xC6, 0xCE, 0xD6, 0xE6, 0xC6, 0x7C, 0x00],
        '1' => [0x18, 0x38, 0x18, 0x18, 0x18, 0x18, 0x7E, 0x00],
        '2' => [0x7C, 0xC6, 0x06, 0x1C, 0x70, 0xC0, 0xFE, 0x00],
        '3' => [0x7C, 0xC6, 0x06, 0x3C, 0x06, 0xC6, 0x7C, 0x00],
        '4' => [0x1C, 0x3C, 0x6C, 0xCC, 0xFE, 0x0C, 0x1E, 0x00],
        '5' => [0xFE, 0xC0, 0xFC, 0x06, 0x06, 0xC6, 0x7C, 0x00],
        '6' => [0x38, 0x60, 0xC0, 0xFC, 0xC6, 0xC6, 0x7C, 0x00],
        '7' => [0xFE, 0xC6, 0x0C, 0x18, 0x30, 0x30, 0x30, 0x00],
        '8' => [0x7C, 0xC6, 0xC6, 0x7C, 0xC6, 0xC6, 0x7C, 0x00],
        '9' => [0x7C, 0xC6, 0xC6, 0x7E, 0x06, 0x0C, 0x78, 0x00],
        ':' => [0x00, 0x18, 0x18, 0x00, 0x00, 0x18, 0x18, 0x00],
        'A' => [0x38, 0x6C, 0xC6, 0xC6, 0xFE, 0xC6, 0xC6, 0x00],
        'B' => [0xFC, 0xC6, 0xC6, 0xFC, 0xC6, 0xC6, 0xFC, 0x00],
        'E' => [0xFE, 0xC0, 0xC0, 0xF8, 0xC0, 0xC0, 0xFE, 0x00],
        'N' => [0xC6, 0xE6, 0xF6, 0xDE, 0xCE, 0xC6, 0xC6, 0x00],
        'R' => [0xFC, 0xC6, 0xC6, 0xFC, 0xD8, 0xCC, 0xC6, 0x00],
        'T' => [0xFF, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x00],
        'Y' => [0xC3, 0xC3, 0x66, 0x3C, 0x18, 0x18, 0x18, 0x00],
        _ => [0x00; 8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(width, height, vec![value; (width * height * 3) as usize]).unwrap()
    }

    fn black(width: u32, height: u32) -> Frame {
        filled(width, height, 0)
    }

    fn annotate(frame: &Frame, battery: Option<u8>) -> RgbImage {
        Overlay::new().annotate(frame, battery).unwrap()
    }

    fn label_area(image: &RgbImage) -> Vec<Rgb<u8>> {
        let y0 = LABEL_Y as u32;
        (y0..y0 + GLYPH_SIZE * BITMAP_SCALE + 2 * LABEL_PAD)
            .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
            .map(|(x, y)| *image.get_pixel(x, y))
            .collect()
    }

    #[test]
    fn labels() {
        assert_eq!(battery_label(Some(87)), "Battery: 87%");
        assert_eq!(battery_label(None), "Battery: N/A");
    }

    #[test]
    fn gauge_fill_tracks_level() {
        let frame = black(200, 100);
        let full = annotate(&frame, Some(100));
        let half = annotate(&frame, Some(50));

        // Inside the gauge, left side is filled in both; right side only when full.
        assert_eq!(full.get_pixel(15, 15), &CHARGE);
        assert_eq!(half.get_pixel(15, 15), &CHARGE);
        assert_eq!(full.get_pixel(100, 15), &CHARGE);
        assert_eq!(half.get_pixel(100, 15), &Rgb([0, 0, 0]));

        assert_eq!(full.get_pixel(10, 10), &OUTLINE);
    }

    #[test]
    fn low_and_unknown_levels_use_warning_colors() {
        let frame = black(200, 100);
        assert_eq!(annotate(&frame, Some(10)).get_pixel(12, 15), &LOW_CHARGE);
        assert_eq!(annotate(&frame, None).get_pixel(12, 15), &UNKNOWN);

        let empty = annotate(&frame, Some(0));
        assert_eq!(empty.get_pixel(12, 15), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_text_is_drawn_on_a_backing_box() {
        let image = annotate(&filled(300, 100, 128), Some(87));

        // Top-left dot of the leading 'B'.
        let text_x = (LABEL_X + LABEL_PAD as i32) as u32;
        let text_y = (LABEL_Y + LABEL_PAD as i32) as u32;
        assert_eq!(image.get_pixel(text_x, text_y), &TEXT);
        assert_eq!(image.get_pixel(LABEL_X as u32, LABEL_Y as u32), &BACKING);

        let lit = label_area(&image).iter().filter(|&&p| p == TEXT).count();
        assert!(lit > 100, "only {lit} text pixels");
    }

    #[test]
    fn one_percent_change_changes_the_label() {
        let frame = black(300, 100);
        let at_50 = annotate(&frame, Some(50));
        let at_51 = annotate(&frame, Some(51));

        // The gauge fill rounds both levels to the same width.
        assert_eq!(at_50.get_pixel(58, 15), at_51.get_pixel(58, 15));
        assert_ne!(at_50, at_51);
        assert_ne!(label_area(&at_50), label_area(&at_51));
    }

    #[test]
    fn unknown_level_is_labelled_differently_from_zero() {
        let frame = black(300, 100);
        assert_ne!(
            label_area(&annotate(&frame, None)),
            label_area(&annotate(&frame, Some(0)))
        );
    }

    #[test]
    fn bitmap_label_size() {
        let overlay = Overlay::default();
        assert_eq!(overlay.label_size(""), (0, 0));
        assert_eq!(overlay.label_size("AB"), (34, 16));
    }

    #[test]
    fn source_frame_is_untouched() {
        let frame = black(200, 100);
        let _ = annotate(&frame, Some(100));
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn tiny_frames_are_clipped() {
        let frame = black(4, 4);
        let image = annotate(&frame, Some(100));
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[test]
    fn unreadable_font_files_are_rejected() {
        let dir = std::env::temp_dir().join(format!("dronelink-font-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let garbage = dir.join("garbage.ttf");
        std::fs::write(&garbage, b"not a font").unwrap();
        assert!(matches!(
            Overlay::from_font_file(&garbage, DEFAULT_FONT_PX),
            Err(VideoError::Font { .. })
        ));

        assert!(matches!(
            Overlay::from_font_file(dir.join("missing.ttf"), DEFAULT_FONT_PX),
            Err(VideoError::Io { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
