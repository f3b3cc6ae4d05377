//! Placeholder flipbook frames for exercising the player without the real
//! dataset: a tinted background, a dark disc, a hand that sways across it,
//! the gloss caption and an `n/N` frame counter.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::gloss;
use crate::manifest::Manifest;
use crate::progress::{ProgressConfig, ProgressReporter};

pub const FRAME_SIZE: u32 = 256;
pub const PLACEHOLDER_FPS: u32 = 24;

#[derive(Debug, Clone, Copy)]
pub struct SampleGloss {
    pub name: &'static str,
    pub frames: usize,
    pub color_start: [u8; 3],
    pub color_end: [u8; 3],
}

const fn sample(
    name: &'static str,
    frames: usize,
    color_start: [u8; 3],
    color_end: [u8; 3],
) -> SampleGloss {
    SampleGloss {
        name,
        frames,
        color_start,
        color_end,
    }
}

pub const SAMPLE_GLOSSES: &[SampleGloss] = &[
    sample("HELLO", 24, [255, 200, 100], [200, 150, 50]),
    sample("THANK-YOU", 30, [100, 200, 255], [50, 150, 200]),
    sample("PLEASE", 24, [200, 255, 150], [150, 200, 100]),
    sample("YES", 18, [150, 255, 150], [100, 200, 100]),
    sample("NO", 18, [255, 150, 150], [200, 100, 100]),
    sample("HELP", 24, [255, 200, 200], [200, 150, 150]),
    sample("SORRY", 24, [200, 200, 255], [150, 150, 200]),
    sample("GOOD", 20, [255, 255, 150], [200, 200, 100]),
    sample("BAD", 20, [150, 150, 150], [100, 100, 100]),
    sample("COFFEE", 30, [139, 90, 43], [100, 60, 30]),
    sample("WATER", 18, [100, 150, 255], [70, 120, 200]),
    sample("FOOD", 24, [255, 180, 100], [200, 140, 70]),
    sample("LOVE", 24, [255, 100, 150], [200, 70, 120]),
    sample("FRIEND", 24, [255, 200, 150], [200, 150, 100]),
    sample("FAMILY", 30, [200, 180, 255], [150, 130, 200]),
    sample("SUBWAY", 30, [100, 100, 200], [70, 70, 150]),
    sample("CITY", 24, [150, 150, 150], [100, 100, 100]),
    sample("TAXI", 24, [255, 200, 0], [200, 150, 0]),
    sample("WORK", 24, [100, 150, 200], [70, 120, 170]),
    sample("MONEY", 24, [100, 200, 100], [70, 150, 70]),
];

const SKIN: Rgb<u8> = Rgb([255, 220, 180]);
const SKIN_EDGE: Rgb<u8> = Rgb([200, 170, 130]);
const FINGERTIP: Rgb<u8> = Rgb([255, 210, 170]);
const DISC: Rgb<u8> = Rgb([30, 30, 40]);
const DISC_EDGE: Rgb<u8> = Rgb([60, 60, 80]);
const LABEL_BG: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_FG: Rgb<u8> = Rgb([255, 200, 50]);
const COUNTER_FG: Rgb<u8> = Rgb([200, 200, 200]);

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const TEXT_SCALE: u32 = 2;

/// 5x7 bitmaps, one byte per row, bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
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
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
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
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        _ => return None,
    };
    Some(rows)
}

/// Pixel width of `text` at `scale`, one blank column between glyphs.
fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * (GLYPH_W + 1) * scale - scale
}

/// Characters without a bitmap render as blanks.
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let gx = x + i as u32 * (GLYPH_W + 1) * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = gx + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < w && py < h {
                            img.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

/// Inclusive rectangle, clipped to the image.
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for y in y0..=y1.min(h.saturating_sub(1)) {
        for x in x0..=x1.min(w.saturating_sub(1)) {
            img.put_pixel(x, y, color);
        }
    }
}

pub fn find_sample(name: &str) -> Option<&'static SampleGloss> {
    SAMPLE_GLOSSES
        .iter()
        .find(|g| g.name.eq_ignore_ascii_case(name))
}

fn lerp_color(start: [u8; 3], end: [u8; 3], t: f32) -> Rgb<u8> {
    let mut out = [0u8; 3];
    for i in 0..3 {
        let s = start[i] as f32;
        let e = end[i] as f32;
        out[i] = (s + (e - s) * t) as u8;
    }
    Rgb(out)
}

fn fill_ellipse(
    img: &mut RgbImage,
    cx: f32,
    cy: f32,
    rx: f32,
    ry: f32,
    fill: Rgb<u8>,
    outline: Option<(Rgb<u8>, f32)>,
) {
    let (w, h) = img.dimensions();
    let x0 = (cx - rx - 1.0).max(0.0) as u32;
    let x1 = ((cx + rx + 1.0).max(0.0) as u32).min(w.saturating_sub(1));
    let y0 = (cy - ry - 1.0).max(0.0) as u32;
    let y1 = ((cy + ry + 1.0).max(0.0) as u32).min(h.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            if dx * dx + dy * dy > 1.0 {
                continue;
            }
            let color = match outline {
                Some((edge, width)) => {
                    let inner_x = ((rx - width).max(0.0) / rx).max(f32::EPSILON);
                    let inner_y = ((ry - width).max(0.0) / ry).max(f32::EPSILON);
                    let inner = (dx / inner_x).powi(2) + (dy / inner_y).powi(2);
                    if inner > 1.0 {
                        edge
                    } else {
                        fill
                    }
                }
                None => fill,
            };
            img.put_pixel(x, y, color);
        }
    }
}

/// Thick segment drawn as a run of discs.
fn draw_line(img: &mut RgbImage, from: (f32, f32), to: (f32, f32), width: f32, color: Rgb<u8>) {
    let len = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
    let steps = (len.ceil() as usize).max(1);
    let r = width / 2.0;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        fill_ellipse(img, x, y, r, r, color, None);
    }
}

fn draw_hand(img: &mut RgbImage, center: (f32, f32), size: f32, t: f32) {
    let wave = (0.5 - t).abs() * 2.0;
    let x = center.0 + 20.0 * (0.5 - t) * 2.0;
    let y = center.1 + 10.0 * wave;

    let palm = size / 2.0;
    fill_ellipse(img, x, y, palm, palm / 1.5, SKIN, Some((SKIN_EDGE, 2.0)));

    let spread = [
        (-0.4 + wave * 0.1, -0.8),
        (-0.2 + wave * 0.05, -0.9),
        (0.0, -1.0),
        (0.2 - wave * 0.05, -0.9),
        (0.4 - wave * 0.1, -0.7),
    ];
    for (i, (dx, dy)) in spread.iter().enumerate() {
        let tip = (x + dx * palm, y + dy * palm);
        let width = if i == 0 { 8.0 } else { 10.0 };
        draw_line(img, (x, y - palm / 3.0), tip, width, SKIN);
        fill_ellipse(img, tip.0, tip.1, 5.0, 5.0, FINGERTIP, None);
    }
}

/// Caption box centred near the bottom edge.
fn draw_caption(img: &mut RgbImage, label: &str) {
    let width = text_width(label, TEXT_SCALE);
    let x = FRAME_SIZE.saturating_sub(width) / 2;
    let y = FRAME_SIZE - 40;
    fill_rect(
        img,
        x.saturating_sub(10),
        y - 5,
        x + width + 10,
        y + 20,
        LABEL_BG,
    );
    draw_text(img, x, y, label, TEXT_SCALE, LABEL_FG);
}

/// Render frame `index` (0-based) of `total` for one sample gloss.
pub fn render_frame(sample: &SampleGloss, index: usize, total: usize) -> RgbImage {
    let t = if total == 0 {
        0.0
    } else {
        index as f32 / total as f32
    };
    let size = FRAME_SIZE as f32;
    let background = lerp_color(sample.color_start, sample.color_end, t);
    let mut img = RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, background);

    let margin = 20.0;
    let r = size / 2.0 - margin;
    let center = size / 2.0;
    fill_ellipse(&mut img, center, center, r, r, DISC, Some((DISC_EDGE, 3.0)));
    draw_hand(&mut img, (center, center + 20.0), 100.0, t);

    draw_caption(&mut img, sample.name);
    let counter = format!("{}/{}", index + 1, total);
    draw_text(&mut img, 10, 10, &counter, TEXT_SCALE, COUNTER_FG);
    img
}

/// Writes all frames of `sample` to `<output>/<NAME>/` and returns the count.
/// Frames left over from an earlier run are removed first.
pub fn generate_gloss(sample: &SampleGloss, output: &Path) -> Result<usize> {
    let dir = output.join(sample.name);
    std::fs::create_dir_all(&dir).with_context(|| format!("create {:?}", dir))?;
    gloss::clear_frames(&dir)?;
    for i in 0..sample.frames {
        let path = dir.join(gloss::frame_file_name(i + 1));
        DynamicImage::ImageRgb8(render_frame(sample, i, sample.frames))
            .save_with_format(&path, ImageFormat::WebP)
            .with_context(|| format!("write {:?}", path))?;
    }
    Ok(sample.frames)
}

#[derive(Debug, Clone)]
pub struct GenerateSummary {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub skipped: Vec<String>,
}

/// Generate placeholder frames for `names` (all samples when empty) and
/// write a manifest marked as generated.
pub fn generate(
    output: &Path,
    names: &[String],
    bucket: &str,
    progress_cfg: ProgressConfig,
) -> Result<GenerateSummary> {
    std::fs::create_dir_all(output)?;
    let mut selected = vec![];
    let mut skipped = vec![];
    if names.is_empty() {
        selected.extend(SAMPLE_GLOSSES.iter());
    } else {
        for name in names {
            match find_sample(name) {
                Some(s) => selected.push(s),
                None => skipped.push(name.clone()),
            }
        }
    }

    let reporter = ProgressReporter::new(
        "generate",
        "glosses",
        selected.len() as u64,
        progress_cfg,
    );
    let progress = reporter.handle();
    for name in &skipped {
        progress.warn(format!("Unknown gloss '{}', skipping", name));
    }

    progress.set_stage("rendering");
    let mut counts = BTreeMap::new();
    for s in selected {
        let n = generate_gloss(s, output)?;
        counts.insert(s.name.to_string(), n);
        progress.inc(1, Some(s.name));
    }

    let mut manifest = Manifest::from_counts(&counts, PLACEHOLDER_FPS, bucket);
    manifest.generated = true;
    let manifest_path = manifest.write(output)?;
    reporter.finish(format!("{} glosses", manifest.glosses.len()));

    Ok(GenerateSummary {
        manifest,
        manifest_path,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressMode;
    use image::GenericImageView;
    use std::fs;
    use tempfile::TempDir;

    fn quiet() -> ProgressConfig {
        ProgressConfig::new(ProgressMode::Quiet)
    }

    fn count_color(img: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) -> usize {
        let mut n = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                if *img.get_pixel(x, y) == color {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn catalog_names_are_unique_and_drawable() {
        let mut names: Vec<_> = SAMPLE_GLOSSES.iter().map(|g| g.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SAMPLE_GLOSSES.len());
        for g in SAMPLE_GLOSSES {
            assert!(g.frames > 0);
            assert!(g.name.chars().all(|c| glyph(c).is_some()), "{}", g.name);
            assert!(text_width(g.name, TEXT_SCALE) + 20 <= FRAME_SIZE);
        }
    }

    #[test]
    fn background_interpolates_between_colours() {
        let coffee = find_sample("coffee").unwrap();
        let first = render_frame(coffee, 0, coffee.frames);
        assert_eq!(*first.get_pixel(0, 0), Rgb(coffee.color_start));
        assert_eq!(*first.get_pixel(FRAME_SIZE / 2, 40), DISC);

        let later = render_frame(coffee, coffee.frames - 1, coffee.frames);
        assert_ne!(*later.get_pixel(0, 0), Rgb(coffee.color_start));
    }

    #[test]
    fn frames_carry_caption_and_counter() {
        let hello = find_sample("HELLO").unwrap();
        let img = render_frame(hello, 0, hello.frames);

        let width = text_width("HELLO", TEXT_SCALE);
        let x = (FRAME_SIZE - width) / 2;
        let y = FRAME_SIZE - 40;
        assert_eq!(*img.get_pixel(x - 5, y - 3), LABEL_BG);
        assert!(count_color(&img, x, y, x + width, y + GLYPH_H * TEXT_SCALE, LABEL_FG) > 0);

        let counter_width = text_width("1/24", TEXT_SCALE);
        let box_h = 10 + GLYPH_H * TEXT_SCALE;
        let first = count_color(&img, 10, 10, 10 + counter_width, box_h, COUNTER_FG);
        assert!(first > 0);

        let last = render_frame(hello, hello.frames - 1, hello.frames);
        let first_box = img.view(10, 10, counter_width, GLYPH_H * TEXT_SCALE).to_image();
        let last_box = last.view(10, 10, counter_width, GLYPH_H * TEXT_SCALE).to_image();
        assert_ne!(first_box.as_raw(), last_box.as_raw());
    }

    #[test]
    fn generates_frames_and_marked_manifest() {
        let tmp = TempDir::new().expect("tempdir");
        let names = vec!["YES".to_string(), "bogus".to_string()];
        let summary = generate(tmp.path(), &names, "avatars", quiet()).unwrap();

        assert_eq!(summary.skipped, vec!["bogus".to_string()]);
        assert!(summary.manifest.generated);
        assert_eq!(summary.manifest.glosses["YES"].frame_count, 18);
        assert_eq!(summary.manifest.glosses["YES"].duration_ms, 750);

        let frames = gloss::list_frames(&tmp.path().join("YES")).unwrap();
        assert_eq!(frames.len(), 18);
        assert!(gloss::is_contiguous(&frames));
        let img = image::open(&frames[0]).unwrap();
        assert_eq!((img.width(), img.height()), (FRAME_SIZE, FRAME_SIZE));
    }

    #[test]
    fn regenerating_over_longer_sequence_matches_disk() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("YES");
        fs::create_dir_all(&dir).unwrap();
        for i in 1..=30 {
            fs::write(dir.join(gloss::frame_file_name(i)), b"stale").unwrap();
        }
        fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let summary = generate(tmp.path(), &["YES".to_string()], "avatars", quiet()).unwrap();
        let on_disk = gloss::list_frames(&dir).unwrap();
        assert_eq!(summary.manifest.glosses["YES"].frame_count, on_disk.len());
        assert_eq!(on_disk.len(), 18);
        assert!(gloss::is_contiguous(&on_disk));
        assert!(dir.join("notes.txt").exists());
    }
}
