use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use zodia_contracts::ZodiacSign;

use crate::Background;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;

/// Overlays horoscope text (and optionally a sign badge) on a background.
///
/// The background is treated as read-only input: it is scaled onto a fresh
/// canvas, never mutated, so every provider can share the same composition
/// path. Text is rendered with a built-in blocky 5x7 font, upper-cased and
/// accent-folded, word-wrapped over a translucent panel in the lower third.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    width: u32,
    height: u32,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn compose(
        &self,
        background: &Background,
        sign: ZodiacSign,
        text: &str,
        show_emoji: bool,
    ) -> RgbaImage {
        let mut canvas = background
            .image()
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgba8();

        let scale = (self.width / 180).max(2);
        let margin = self.width / 12;
        let panel_top = self.height * 58 / 100;
        let panel_bottom = self.height * 92 / 100;
        shade_rect(
            &mut canvas,
            margin,
            panel_top,
            self.width.saturating_sub(margin),
            panel_bottom,
            140,
        );

        let inner_left = margin + scale * 2;
        let inner_right = self.width.saturating_sub(margin + scale * 2);
        let char_width = (GLYPH_WIDTH + GLYPH_SPACING) * scale;
        let line_height = (GLYPH_HEIGHT + 2) * scale;
        let chars_per_line = (inner_right.saturating_sub(inner_left) / char_width).max(1) as usize;
        let max_lines = ((panel_bottom - panel_top).saturating_sub(scale * 2) / line_height) as usize;

        let folded = fold_accents(text).to_uppercase();
        let lines = wrap_text(&folded, chars_per_line, max_lines.max(1));
        let block_height = lines.len() as u32 * line_height;
        let mut y = panel_top + ((panel_bottom - panel_top).saturating_sub(block_height)) / 2;
        for line in &lines {
            let line_width = line.chars().count() as u32 * char_width;
            let x = inner_left
                + inner_right
                    .saturating_sub(inner_left)
                    .saturating_sub(line_width)
                    / 2;
            draw_line(&mut canvas, line, x, y, scale, Rgba([255, 255, 255, 255]));
            y += line_height;
        }

        if show_emoji {
            self.draw_sign_badge(&mut canvas, sign, panel_top, scale);
        }

        canvas
    }

    /// Accent-colored disc with the sign's three-letter abbreviation, centered
    /// above the text panel. Stands in for the emoji glyph the whole way
    /// down the pipeline: present only when the caller asked for it.
    fn draw_sign_badge(&self, canvas: &mut RgbaImage, sign: ZodiacSign, panel_top: u32, scale: u32) {
        let radius = (self.width / 10).max(GLYPH_HEIGHT * scale);
        let cx = self.width / 2;
        let cy = panel_top.saturating_sub(radius + radius / 2);
        let [r, g, b] = sign.accent_color();

        for y in cy.saturating_sub(radius)..(cy + radius).min(self.height) {
            for x in cx.saturating_sub(radius)..(cx + radius).min(self.width) {
                let dx = x as i64 - cx as i64;
                let dy = y as i64 - cy as i64;
                let dist_sq = dx * dx + dy * dy;
                let radius_sq = (radius as i64) * (radius as i64);
                if dist_sq <= radius_sq {
                    let ring = (radius as i64 - scale as i64 * 2).max(0);
                    let pixel = if dist_sq > ring * ring {
                        Rgba([20, 16, 38, 255])
                    } else {
                        Rgba([r, g, b, 255])
                    };
                    canvas.put_pixel(x, y, pixel);
                }
            }
        }

        let label = sign.abbreviation();
        let char_width = (GLYPH_WIDTH + GLYPH_SPACING) * scale;
        let label_width = label.chars().count() as u32 * char_width;
        let x = cx.saturating_sub(label_width / 2);
        let y = cy.saturating_sub(GLYPH_HEIGHT * scale / 2);
        draw_line(canvas, label, x, y, scale, Rgba([20, 16, 38, 255]));
    }
}

/// Darkens a rectangle in place by alpha-blending black over it.
fn shade_rect(canvas: &mut RgbaImage, left: u32, top: u32, right: u32, bottom: u32, alpha: u16) {
    for y in top..bottom.min(canvas.height()) {
        for x in left..right.min(canvas.width()) {
            let pixel = canvas.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut().take(3) {
                *channel = ((*channel as u16 * (255 - alpha)) / 255) as u8;
            }
        }
    }
}

fn draw_line(canvas: &mut RgbaImage, line: &str, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let mut cursor = x;
    for ch in line.chars() {
        draw_glyph(canvas, ch, cursor, y, scale, color);
        cursor += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    }
}

fn draw_glyph(canvas: &mut RgbaImage, ch: char, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let rows = glyph_rows(ch);
    for (row_idx, row) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if row & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + col * scale + dx;
                    let py = y + row_idx as u32 * scale + dy;
                    if px < canvas.width() && py < canvas.height() {
                        canvas.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

/// Greedy word wrap. Words longer than a line are hard-split; output is
/// truncated to `max_lines` with a trailing ellipsis-dot marker.
fn wrap_text(text: &str, chars_per_line: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > chars_per_line {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(chars_per_line).collect();
            word = word.chars().skip(chars_per_line).collect();
            lines.push(head);
        }
        let needed = word.chars().count() + if current.is_empty() { 0 } else { 1 };
        if current.chars().count() + needed > chars_per_line && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            while last.chars().count() + 3 > chars_per_line && !last.is_empty() {
                last.pop();
            }
            last.push_str("...");
        }
    }
    lines
}

/// Maps the accented characters common in horoscope copy onto the ASCII
/// subset the bitmap font covers.
fn fold_accents(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => Some('a'),
            'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => Some('e'),
            'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => Some('i'),
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => Some('o'),
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            '¡' | '¿' => None,
            other => Some(other),
        })
        .collect()
}

/// 5x7 bitmap glyphs, one bit per pixel, MSB on the left. Unknown characters
/// render as a hollow box so layout stays stable.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch {
        ' ' => [0x00; 7],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        '\'' => [0x0C, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use image::DynamicImage;

    use zodia_contracts::ZodiacSign;

    use super::{fold_accents, wrap_text, Compositor};
    use crate::Background;

    fn flat_background(r: u8, g: u8, b: u8) -> Background {
        let mut image = image::RgbImage::new(32, 64);
        for pixel in image.pixels_mut() {
            *pixel = image::Rgb([r, g, b]);
        }
        Background::new(DynamicImage::ImageRgb8(image))
    }

    #[test]
    fn compose_matches_canvas_dimensions() {
        let compositor = Compositor::new(108, 192);
        let out = compositor.compose(&flat_background(10, 20, 30), ZodiacSign::Leo, "Hola", true);
        assert_eq!((out.width(), out.height()), (108, 192));
    }

    #[test]
    fn compose_does_not_mutate_the_background() {
        let background = flat_background(10, 20, 30);
        let before = background.image().to_rgba8();
        let compositor = Compositor::new(108, 192);
        let _ = compositor.compose(&background, ZodiacSign::Leo, "Hola", true);
        assert_eq!(background.image().to_rgba8(), before);
    }

    #[test]
    fn emoji_flag_changes_the_output() {
        let background = flat_background(200, 180, 40);
        let compositor = Compositor::new(108, 192);
        let with_badge = compositor.compose(&background, ZodiacSign::Leo, "Hola", true);
        let without_badge = compositor.compose(&background, ZodiacSign::Leo, "Hola", false);
        assert_ne!(with_badge.as_raw(), without_badge.as_raw());
    }

    #[test]
    fn compose_is_deterministic() {
        let background = flat_background(90, 10, 120);
        let compositor = Compositor::new(108, 192);
        let first = compositor.compose(&background, ZodiacSign::Pisces, "Sueños", true);
        let second = compositor.compose(&background, ZodiacSign::Pisces, "Sueños", true);
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn text_changes_the_output() {
        let background = flat_background(90, 10, 120);
        let compositor = Compositor::new(108, 192);
        let first = compositor.compose(&background, ZodiacSign::Leo, "Hoy brillas", false);
        let second = compositor.compose(&background, ZodiacSign::Leo, "Manana no", false);
        assert_ne!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn wrap_respects_line_width() {
        let lines = wrap_text("TU CORAZON BRILLA CON LUZ PROPIA", 10, 8);
        assert!(lines.iter().all(|line| line.chars().count() <= 10));
        assert!(lines.len() >= 3);
    }

    #[test]
    fn wrap_truncates_to_max_lines() {
        let lines = wrap_text("UNO DOS TRES CUATRO CINCO SEIS SIETE OCHO", 4, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("..."));
    }

    #[test]
    fn accents_fold_to_ascii() {
        assert_eq!(fold_accents("corazón brilla, mañana"), "corazon brilla, manana");
        assert_eq!(fold_accents("¡Éxito!"), "Exito!");
    }
}
