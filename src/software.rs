//! Software frame reading for the extraction fallback path.
//!
//! Frames are pulled one at a time from a [`FrameSource`], decimated to the
//! target rate by integer stepping, downscaled and written as WebP stills.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::path::Path;

use crate::gloss;

/// A decoded video, read front to back.
pub trait FrameSource {
    /// Native frame rate of the source, frames per second.
    fn frame_rate(&self) -> f64;

    /// Next frame in playback order, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// `floor(source_fps / target_fps)`, never below 1.
pub fn decimation_step(source_fps: f64, target_fps: u32) -> usize {
    if target_fps == 0 || !source_fps.is_finite() || source_fps <= target_fps as f64 {
        return 1;
    }
    ((source_fps / target_fps as f64).floor() as usize).max(1)
}

/// Dimensions with the longest side clamped to `max_dim`, aspect preserved.
pub fn scaled_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width, height);
    }
    let scale = max_dim as f64 / longest as f64;
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}

/// Drain `source` into `output_dir` as `0001.webp`, `0002.webp`, ...
/// Returns the number of frames written.
pub fn extract_from_source(
    source: &mut dyn FrameSource,
    output_dir: &Path,
    target_fps: u32,
    max_dim: u32,
) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let step = decimation_step(source.frame_rate(), target_fps);
    log::debug!(
        "software extract: source_fps={:.2} target_fps={} step={}",
        source.frame_rate(),
        target_fps,
        step
    );

    let mut read = 0usize;
    let mut saved = 0usize;
    while let Some(frame) = source.next_frame()? {
        if read % step == 0 {
            saved += 1;
            let out = output_dir.join(gloss::frame_file_name(saved));
            write_frame(frame, &out, max_dim)?;
        }
        read += 1;
    }
    Ok(saved)
}

fn write_frame(frame: RgbImage, out: &Path, max_dim: u32) -> Result<()> {
    let (w, h) = scaled_dimensions(frame.width(), frame.height(), max_dim);
    let frame = if (w, h) != frame.dimensions() {
        image::imageops::resize(&frame, w, h, FilterType::Triangle)
    } else {
        frame
    };
    DynamicImage::ImageRgb8(frame)
        .save_with_format(out, ImageFormat::WebP)
        .with_context(|| format!("encode frame {:?}", out))
}

/// Opens the platform decoder for `path`.
#[cfg(feature = "software-decode")]
pub fn open(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ffmpeg_source::FfmpegFrameSource::open(path)?))
}

#[cfg(not(feature = "software-decode"))]
pub fn open(path: &Path) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "cannot decode {:?}: built without the `software-decode` feature",
        path
    )
}

#[cfg(feature = "software-decode")]
mod ffmpeg_source {
    use super::FrameSource;
    use anyhow::{anyhow, Context, Result};
    use ffmpeg_next as ffmpeg;
    use image::RgbImage;
    use std::path::Path;

    pub struct FfmpegFrameSource {
        input: ffmpeg::format::context::Input,
        stream_index: usize,
        decoder: ffmpeg::codec::decoder::Video,
        scaler: ffmpeg::software::scaling::Context,
        frame_rate: f64,
        eof_sent: bool,
    }

    impl FfmpegFrameSource {
        pub fn open(path: &Path) -> Result<Self> {
            ffmpeg::init().context("initialize ffmpeg")?;
            let input = ffmpeg::format::input(&path)
                .with_context(|| format!("open {:?} with ffmpeg", path))?;
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("{:?} has no video track", path))?;
            let stream_index = stream.index();
            let frame_rate = f64::from(stream.avg_frame_rate());
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .context("load video decoder parameters")?;
            let decoder = context
                .decoder()
                .video()
                .context("open ffmpeg video decoder")?;

            let scaler = ffmpeg::software::scaling::context::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                ffmpeg::util::format::pixel::Pixel::RGB24,
                decoder.width(),
                decoder.height(),
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .context("create ffmpeg scaler")?;

            Ok(Self {
                input,
                stream_index,
                decoder,
                scaler,
                frame_rate,
                eof_sent: false,
            })
        }

        fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage> {
            let mut rgb = ffmpeg::frame::Video::empty();
            self.scaler
                .run(decoded, &mut rgb)
                .context("scale frame to RGB")?;

            let width = rgb.width();
            let height = rgb.height();
            let row_bytes = width as usize * 3;
            let stride = rgb.stride(0);
            let data = rgb.data(0);

            let mut pixels = Vec::with_capacity(row_bytes * height as usize);
            for row in 0..height as usize {
                let start = row * stride;
                pixels.extend_from_slice(
                    data.get(start..start + row_bytes)
                        .context("ffmpeg frame row is out of bounds")?,
                );
            }
            RgbImage::from_raw(width, height, pixels)
                .ok_or_else(|| anyhow!("decoded frame has inconsistent size"))
        }
    }

    impl FrameSource for FfmpegFrameSource {
        fn frame_rate(&self) -> f64 {
            self.frame_rate
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            let mut decoded = ffmpeg::frame::Video::empty();
            loop {
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    return self.convert(&decoded).map(Some);
                }
                if self.eof_sent {
                    return Ok(None);
                }
                let next = self
                    .input
                    .packets()
                    .next()
                    .map(|(stream, packet)| (stream.index(), packet));
                match next {
                    Some((index, packet)) => {
                        if index == self.stream_index {
                            self.decoder
                                .send_packet(&packet)
                                .context("send packet to ffmpeg decoder")?;
                        }
                    }
                    None => {
                        self.decoder.send_eof().context("flush ffmpeg decoder")?;
                        self.eof_sent = true;
                    }
                }
            }
        }
    }
}
