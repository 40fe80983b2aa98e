//! 解码引擎接口
//!
//! 容器解封装、音视频解码、像素缩放、音频重采样和字幕字形光栅化
//! 都由外部引擎完成，本 crate 只通过这里的窄接口与其交互。
//! `glyph` 提供基于 resvg 的光栅化器，ffmpeg 后端默认安装它。

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "glyphs")]
pub mod glyph;
#[cfg(test)]
pub mod mock;

use crate::core::{
    AudioSpec, EngineVersions, FormatId, MediaKind, Result, SessionConfig, StreamInfo,
};
use crate::player::cue::CueTrack;
use crate::stream::ByteSource;
use image::RgbaImage;

/// 数据包的时间信息（流时间基）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketInfo {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// 0 表示未知
    pub duration: i64,
    pub is_key: bool,
}

pub trait Packet {
    fn info(&self) -> PacketInfo;
}

/// 解码后的视频帧
pub trait VideoFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> FormatId;
    fn plane(&self, index: usize) -> Option<&[u8]>;
    fn stride(&self, index: usize) -> Option<usize>;
    /// best-effort 时间戳（流时间基）
    fn timestamp(&self) -> Option<i64>;
}

/// 解码后的音频帧
pub trait AudioFrame {
    fn samples(&self) -> usize;
    fn spec(&self) -> AudioSpec;
    fn timestamp(&self) -> Option<i64>;
}

/// 读取数据包的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    Packet,
    /// 缓冲暂时没有数据
    Again,
    Eof,
}

/// 送包结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Accepted,
    /// 解码器内部积压，需要先取出帧；数据包未被接收
    Backlogged,
}

/// 取帧结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    Frame,
    Again,
    /// 冲刷完成，不会再有帧
    Eof,
}

/// 已打开的容器
pub trait Container {
    type Packet;

    fn streams(&self) -> &[StreamInfo];

    /// 总时长（秒），未知时为 0.0
    fn duration_seconds(&self) -> f64;

    /// 引擎评分最高的指定类型流
    fn best_stream(&self, kind: MediaKind) -> Option<usize>;

    fn read_packet(&mut self, packet: &mut Self::Packet) -> Result<PacketStatus>;

    /// 定位到目标之前（含）的关键帧，不允许越过目标
    fn seek(&mut self, target_us: i64) -> Result<()>;

    fn set_seekable(&mut self, seekable: bool);

    /// 追加了新数据，清除读取层残留的 EOF / 错误标志
    fn input_appended(&mut self);

    /// 读取层从新的绝对字节位置继续
    fn restart_at(&mut self, position: u64);
}

/// 音视频解码器（送包 / 取帧模型）
pub trait FrameDecoder {
    type Packet;
    type Frame;

    fn send_packet(&mut self, packet: &Self::Packet) -> Result<SendStatus>;

    /// 发送冲刷信号
    fn send_eof(&mut self) -> Result<()>;

    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<ReceiveStatus>;

    /// 丢弃内部状态（Seek 之后）
    fn flush(&mut self);
}

/// 字幕矩形内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleRect {
    /// 完整的 ASS 事件行
    Ass(String),
    /// 纯文本
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedSubtitle {
    /// 解码器给出的显示结束时间（毫秒），0 表示未知
    pub end_display_ms: u32,
    pub rects: Vec<SubtitleRect>,
}

pub trait SubtitleDecoder {
    type Packet;

    /// 解码一个字幕包，没有产出时返回 `None`
    fn decode(&mut self, packet: &Self::Packet) -> Result<Option<DecodedSubtitle>>;

    /// 编解码器私有头（ASS `[Script Info]` 等）
    fn header(&self) -> Option<&str>;
}

/// 视频帧 → RGBA
pub trait Scaler {
    type Frame;

    fn scale(&mut self, frame: &Self::Frame, image: &mut RgbaImage) -> Result<()>;
}

/// 音频帧 → 立体声 48 kHz 交错 f32
pub trait Resampler {
    type Frame;

    /// 本帧最多产出的每声道采样数
    fn output_capacity(&mut self, frame: &Self::Frame) -> Result<usize>;

    /// 转换到 `out`，返回实际写入的每声道采样数
    fn convert(&mut self, frame: &Self::Frame, out: &mut [f32]) -> Result<usize>;
}

/// 光栅化后的字幕位图（单色覆盖率蒙版）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueBitmap {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub coverage: Vec<u8>,
    /// RGB
    pub color: [u8; 3],
    /// 整体不透明度
    pub opacity: u8,
}

/// 字幕字形光栅化器
pub trait CueRasterizer {
    fn add_font(&mut self, name: &str, data: &[u8]);

    /// 渲染 `time_ms` 时刻可见的字幕
    fn render(&mut self, track: &CueTrack, time_ms: i64, width: u32, height: u32) -> Vec<CueBitmap>;
}

/// 解码引擎
///
/// 关联类型把一个后端的各个部件绑在一起，会话按静态分发使用。
pub trait Engine {
    type Packet: Packet;
    type VideoFrame: VideoFrame;
    type AudioFrame: AudioFrame;
    type Container: Container<Packet = Self::Packet>;
    type VideoDecoder: FrameDecoder<Packet = Self::Packet, Frame = Self::VideoFrame>;
    type AudioDecoder: FrameDecoder<Packet = Self::Packet, Frame = Self::AudioFrame>;
    type SubtitleDecoder: SubtitleDecoder<Packet = Self::Packet>;
    type Scaler: Scaler<Frame = Self::VideoFrame>;
    type Resampler: Resampler<Frame = Self::AudioFrame>;

    /// 探测格式并打开容器，数据不足时返回 `WouldBlock`
    fn open_container(
        &mut self,
        source: ByteSource,
        format_hint: Option<&str>,
        config: &SessionConfig,
    ) -> Result<Self::Container>;

    /// 打开解码器；内部多线程一律关闭
    fn open_video_decoder(&mut self, container: &Self::Container, stream: usize) -> Result<Self::VideoDecoder>;
    fn open_audio_decoder(&mut self, container: &Self::Container, stream: usize) -> Result<Self::AudioDecoder>;
    fn open_subtitle_decoder(
        &mut self,
        container: &Self::Container,
        stream: usize,
    ) -> Result<Self::SubtitleDecoder>;

    fn new_packet(&self) -> Self::Packet;
    fn new_video_frame(&self) -> Self::VideoFrame;
    fn new_audio_frame(&self) -> Self::AudioFrame;

    fn create_scaler(&mut self, frame: &Self::VideoFrame) -> Result<Self::Scaler>;
    fn create_resampler(&mut self, frame: &Self::AudioFrame) -> Result<Self::Resampler>;

    fn versions(&self) -> EngineVersions;

    /// 是否有指定名称的解码器
    fn has_decoder(&self, name: &str) -> bool;

    /// 引擎自带的字幕光栅化器，会话创建时安装
    fn cue_rasterizer(&self) -> Option<Box<dyn CueRasterizer>> {
        None
    }
}
