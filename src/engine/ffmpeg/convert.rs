use super::decoder::{FfmpegAudioFrame, FfmpegVideoFrame};
use crate::core::{PlayerError, Result, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::engine::{Resampler, Scaler};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::util::{channel_layout::ChannelLayout, format, frame};
use image::RgbaImage;
use std::ffi::c_int;
use std::ptr;

/// 像素格式转换：任意格式 → 同尺寸 RGBA（双线性）
pub struct FfmpegScaler {
    context: scaling::Context,
}

impl FfmpegScaler {
    pub(super) fn new(frame: &FfmpegVideoFrame) -> Result<Self> {
        let source = &frame.0;
        let context = scaling::Context::get(
            source.format(),
            source.width(),
            source.height(),
            format::Pixel::RGBA,
            source.width(),
            source.height(),
            scaling::Flags::BILINEAR,
        )?;
        Ok(Self { context })
    }
}

impl Scaler for FfmpegScaler {
    type Frame = FfmpegVideoFrame;

    /// 直接写入缓存的 RGBA 图像（紧凑行距 `width * 4`）
    fn scale(&mut self, frame: &FfmpegVideoFrame, image: &mut RgbaImage) -> Result<()> {
        let source = &frame.0;
        if (source.width(), source.height()) != image.dimensions() {
            return Err(PlayerError::invalid_state(format!(
                "帧尺寸 {}x{} 与 RGBA 缓冲 {}x{} 不一致",
                source.width(),
                source.height(),
                image.width(),
                image.height()
            )));
        }

        let dst_planes: [*mut u8; 4] = [image.as_mut_ptr(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut()];
        let dst_strides: [c_int; 4] = [(image.width() * 4) as c_int, 0, 0, 0];

        let ret = unsafe {
            let raw = source.as_ptr();
            ffi::sws_scale(
                self.context.as_mut_ptr(),
                (*raw).data.as_ptr() as *const *const u8,
                (*raw).linesize.as_ptr(),
                0,
                source.height() as c_int,
                dst_planes.as_ptr(),
                dst_strides.as_ptr(),
            )
        };
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }
        Ok(())
    }
}

/// 音频重采样：任意格式 → 立体声 48 kHz 交错 f32
pub struct FfmpegResampler {
    context: resampling::Context,
}

fn channel_layout(frame: &frame::Audio) -> ChannelLayout {
    let layout = frame.channel_layout();
    if layout.is_empty() {
        ChannelLayout::default(frame.channels() as i32)
    } else {
        layout
    }
}

impl FfmpegResampler {
    pub(super) fn new(frame: &FfmpegAudioFrame) -> Result<Self> {
        let source = &frame.0;
        let context = resampling::Context::get(
            source.format(),
            channel_layout(source),
            source.rate(),
            format::Sample::F32(format::sample::Type::Packed),
            ChannelLayout::STEREO,
            OUTPUT_SAMPLE_RATE,
        )?;
        Ok(Self { context })
    }
}

impl Resampler for FfmpegResampler {
    type Frame = FfmpegAudioFrame;

    fn output_capacity(&mut self, frame: &FfmpegAudioFrame) -> Result<usize> {
        let samples = unsafe { ffi::swr_get_out_samples(self.context.as_mut_ptr(), frame.0.samples() as c_int) };
        if samples < 0 {
            return Err(ffmpeg::Error::from(samples).into());
        }
        Ok(samples as usize)
    }

    fn convert(&mut self, frame: &FfmpegAudioFrame, out: &mut [f32]) -> Result<usize> {
        let capacity = out.len() / OUTPUT_CHANNELS as usize;
        let mut planes = [out.as_mut_ptr() as *mut u8];

        let converted = unsafe {
            ffi::swr_convert(
                self.context.as_mut_ptr(),
                planes.as_mut_ptr(),
                capacity as c_int,
                (*frame.0.as_ptr()).extended_data as *mut *const u8,
                frame.0.samples() as c_int,
            )
        };
        if converted < 0 {
            return Err(ffmpeg::Error::from(converted).into());
        }
        Ok(converted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> FfmpegVideoFrame {
        let mut frame = frame::Video::new(format::Pixel::YUV420P, width, height);
        for plane in 0..3 {
            frame.data_mut(plane).fill(128);
        }
        FfmpegVideoFrame(frame)
    }

    #[test]
    fn test_scale_writes_into_cached_image() {
        let frame = gray_frame(16, 8);
        let mut scaler = FfmpegScaler::new(&frame).unwrap();
        let mut image = RgbaImage::new(16, 8);

        scaler.scale(&frame, &mut image).unwrap();
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            assert_eq!(a, 255);
            assert!(r.abs_diff(g) <= 2 && g.abs_diff(b) <= 2);
            assert!((110..=150).contains(&r), "灰度 {}", r);
        }
    }

    #[test]
    fn test_scale_rejects_mismatched_image() {
        let frame = gray_frame(16, 8);
        let mut scaler = FfmpegScaler::new(&frame).unwrap();
        let mut image = RgbaImage::new(8, 8);
        assert!(matches!(
            scaler.scale(&frame, &mut image),
            Err(PlayerError::InvalidState(_))
        ));
    }
}
