//! myy_stream：渐进式字节流解码核心
//!
//! 调用方把陆续到达的媒体字节推入 [`Session`]，再逐个拉取解码单元：
//! 视频帧、重采样后的音频块，或者"暂无数据" / "已结束"。
//! 字幕包进入时间线，可叠加到 RGBA 帧上。容器解析和解码交给 [`engine::Engine`]
//! 的实现，启用 `ffmpeg` feature 时提供基于 ffmpeg-next 的后端。

pub mod core;
pub mod engine;
pub mod player;
pub mod stream;

pub use crate::core::{
    MediaKind, PlayerError, Result, SessionConfig, SessionState, StreamInfo, StreamSelection, Unit,
};
pub use crate::player::{AudioChunk, Session, SubtitleFormat};
pub use crate::stream::{ByteSource, StreamBuffer};

#[cfg(feature = "ffmpeg")]
pub use crate::engine::ffmpeg::FfmpegEngine;
#[cfg(feature = "glyphs")]
pub use crate::engine::glyph::SvgCueRasterizer;
