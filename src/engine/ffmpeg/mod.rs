//! ffmpeg-next 解码后端
//!
//! 容器通过自定义 AVIO 从会话缓冲读取（非阻塞，数据不足时返回 EAGAIN）。
//! 自带基于 resvg 的字幕光栅化器（系统字体 + 宿主添加的字体），
//! 宿主也可通过 `Session::set_cue_rasterizer` 换成自己的实现。

mod container;
mod convert;
mod decoder;
mod io;

pub use container::FfmpegContainer;
pub use convert::{FfmpegResampler, FfmpegScaler};
pub use decoder::{
    FfmpegAudioDecoder, FfmpegAudioFrame, FfmpegDecoder, FfmpegPacket, FfmpegSubtitleDecoder,
    FfmpegVideoDecoder, FfmpegVideoFrame, RawFrame,
};

use crate::core::{EngineVersions, Result, SessionConfig};
use crate::engine::glyph::SvgCueRasterizer;
use crate::engine::{CueRasterizer, Engine};
use crate::stream::ByteSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::util::frame;
use log::info;
use std::ffi::CString;
use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

/// FFmpeg 解码引擎
pub struct FfmpegEngine {
    _private: (),
}

impl FfmpegEngine {
    pub fn new() -> Result<Self> {
        ffmpeg::init()?;
        FFMPEG_INIT.call_once(|| {
            // 引擎自身的日志只保留错误
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
            info!(
                "FFmpeg 初始化完成 (avcodec {:#x}, avformat {:#x})",
                unsafe { ffi::avcodec_version() },
                unsafe { ffi::avformat_version() }
            );
        });
        Ok(Self { _private: () })
    }
}

impl Engine for FfmpegEngine {
    type Packet = FfmpegPacket;
    type VideoFrame = FfmpegVideoFrame;
    type AudioFrame = FfmpegAudioFrame;
    type Container = FfmpegContainer;
    type VideoDecoder = FfmpegVideoDecoder;
    type AudioDecoder = FfmpegAudioDecoder;
    type SubtitleDecoder = FfmpegSubtitleDecoder;
    type Scaler = FfmpegScaler;
    type Resampler = FfmpegResampler;

    fn open_container(
        &mut self,
        source: ByteSource,
        format_hint: Option<&str>,
        config: &SessionConfig,
    ) -> Result<FfmpegContainer> {
        container::open(source, format_hint, config)
    }

    fn open_video_decoder(&mut self, container: &FfmpegContainer, stream: usize) -> Result<FfmpegVideoDecoder> {
        decoder::open_video(container, stream)
    }

    fn open_audio_decoder(&mut self, container: &FfmpegContainer, stream: usize) -> Result<FfmpegAudioDecoder> {
        decoder::open_audio(container, stream)
    }

    fn open_subtitle_decoder(
        &mut self,
        container: &FfmpegContainer,
        stream: usize,
    ) -> Result<FfmpegSubtitleDecoder> {
        decoder::open_subtitle(container, stream)
    }

    fn new_packet(&self) -> FfmpegPacket {
        FfmpegPacket(ffmpeg::Packet::empty())
    }

    fn new_video_frame(&self) -> FfmpegVideoFrame {
        FfmpegVideoFrame(frame::Video::empty())
    }

    fn new_audio_frame(&self) -> FfmpegAudioFrame {
        FfmpegAudioFrame(frame::Audio::empty())
    }

    fn create_scaler(&mut self, frame: &FfmpegVideoFrame) -> Result<FfmpegScaler> {
        FfmpegScaler::new(frame)
    }

    fn create_resampler(&mut self, frame: &FfmpegAudioFrame) -> Result<FfmpegResampler> {
        FfmpegResampler::new(frame)
    }

    fn versions(&self) -> EngineVersions {
        unsafe {
            EngineVersions {
                codec: ffi::avcodec_version(),
                format: ffi::avformat_version(),
                util: ffi::avutil_version(),
            }
        }
    }

    /// 按解码器名或编码名查找（`av1` 可能由 libdav1d 等外部解码器提供）
    fn has_decoder(&self, name: &str) -> bool {
        if ffmpeg::decoder::find_by_name(name).is_some() {
            return true;
        }
        let Ok(cname) = CString::new(name) else {
            return false;
        };
        unsafe {
            let descriptor = ffi::avcodec_descriptor_get_by_name(cname.as_ptr());
            !descriptor.is_null() && !ffi::avcodec_find_decoder((*descriptor).id).is_null()
        }
    }

    fn cue_rasterizer(&self) -> Option<Box<dyn CueRasterizer>> {
        Some(Box::new(SvgCueRasterizer::with_system_fonts()))
    }
}
