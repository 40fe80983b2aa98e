//! 测试用脚本化引擎
//!
//! 通过真实的 `ByteSource` 读取一种极简容器格式，
//! 让调度器和会话测试走真实的缓冲、驻留和 WouldBlock 路径。
//!
//! 格式（小端）：
//! - 头：`MOCK` | u32 时长(ms) | u8 流数量 | 每个流: u8 类型, u8 默认标志, u8+编码名, u8+语言
//! - 记录：u8 流 | u8 标志(bit0 关键帧) | i64 pts | i64 dts | u32 时长 | u16 长度 | 负载
//!
//! 所有流的时间基都是 1/1000。

use crate::core::{
    AudioSpec, EngineVersions, FormatId, MediaKind, PlayerError, Rational, Result, SessionConfig,
    StreamInfo, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE,
};
use crate::engine::{
    AudioFrame, Container, CueBitmap, CueRasterizer, DecodedSubtitle, Engine, FrameDecoder, Packet,
    PacketInfo, PacketStatus, ReceiveStatus, Resampler, Scaler, SendStatus, SubtitleDecoder,
    SubtitleRect, VideoFrame,
};
use crate::player::cue::CueTrack;
use crate::player::Session;
use crate::stream::{ByteSource, ReadOutcome};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"MOCK";
const RECORD_HEADER: usize = 24;
const NO_TIMESTAMP: i64 = i64::MIN;
const TIME_BASE: Rational = Rational::new(1, 1000);

/// AVERROR_INVALIDDATA
const INVALID_DATA: i32 = -1094995529;

fn kind_code(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Video => 0,
        MediaKind::Audio => 1,
        MediaKind::Subtitle => 2,
        _ => 3,
    }
}

fn kind_from_code(code: u8) -> MediaKind {
    match code {
        0 => MediaKind::Video,
        1 => MediaKind::Audio,
        2 => MediaKind::Subtitle,
        _ => MediaKind::Data,
    }
}

fn codec_id(name: &str) -> u32 {
    match name {
        "h264" => 27,
        "hevc" => 173,
        "av1" => 226,
        "aac" => 86018,
        "ass" => 94230,
        "subrip" => 94248,
        _ => 0,
    }
}

/// 容器文件构造器
#[derive(Debug, Clone, Default)]
pub struct MockFile {
    duration_ms: u32,
    streams: Vec<(MediaKind, String, bool, String)>,
    records: Vec<u8>,
}

impl MockFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration_ms(mut self, ms: u32) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn stream(self, kind: MediaKind, codec: &str, is_default: bool) -> Self {
        self.stream_lang(kind, codec, is_default, "")
    }

    pub fn stream_lang(mut self, kind: MediaKind, codec: &str, is_default: bool, lang: &str) -> Self {
        self.streams
            .push((kind, codec.to_string(), is_default, lang.to_string()));
        self
    }

    pub fn packet(
        mut self,
        stream: u8,
        key: bool,
        pts: Option<i64>,
        dts: Option<i64>,
        duration: u32,
        payload: &[u8],
    ) -> Self {
        self.records.push(stream);
        self.records.push(key as u8);
        self.records
            .extend_from_slice(&pts.unwrap_or(NO_TIMESTAMP).to_le_bytes());
        self.records
            .extend_from_slice(&dts.unwrap_or(NO_TIMESTAMP).to_le_bytes());
        self.records.extend_from_slice(&duration.to_le_bytes());
        self.records
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.records.extend_from_slice(payload);
        self
    }

    /// 4x2 的视频帧，亮度为 `fill`
    pub fn video(self, stream: u8, pts_ms: i64, key: bool, fill: u8) -> Self {
        self.video_sized(stream, pts_ms, key, 4, 2, fill)
    }

    pub fn video_sized(self, stream: u8, pts_ms: i64, key: bool, width: u16, height: u16, fill: u8) -> Self {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&width.to_le_bytes());
        payload.extend_from_slice(&height.to_le_bytes());
        payload.push(0);
        payload.push(fill);
        self.packet(stream, key, Some(pts_ms), Some(pts_ms), 40, &payload)
    }

    /// 48 kHz 单声道音频
    pub fn audio(self, stream: u8, pts_ms: i64, samples: u16) -> Self {
        let mut payload = Vec::with_capacity(7);
        payload.extend_from_slice(&samples.to_le_bytes());
        payload.push(1);
        payload.extend_from_slice(&48_000u32.to_le_bytes());
        self.packet(stream, true, Some(pts_ms), Some(pts_ms), 20, &payload)
    }

    pub fn subtitle(self, stream: u8, pts: Option<i64>, dts: Option<i64>, duration: u32, end_display_ms: u32, text: &str) -> Self {
        let mut payload = end_display_ms.to_le_bytes().to_vec();
        payload.extend_from_slice(text.as_bytes());
        self.packet(stream, true, pts, dts, duration, &payload)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.duration_ms.to_le_bytes());
        out.push(self.streams.len() as u8);
        for (kind, codec, is_default, lang) in &self.streams {
            out.push(kind_code(*kind));
            out.push(*is_default as u8);
            out.push(codec.len() as u8);
            out.extend_from_slice(codec.as_bytes());
            out.push(lang.len() as u8);
            out.extend_from_slice(lang.as_bytes());
        }
        out.extend_from_slice(&self.records);
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockPacket {
    info: PacketInfo,
    payload: Vec<u8>,
}

impl Packet for MockPacket {
    fn info(&self) -> PacketInfo {
        self.info
    }
}

#[derive(Debug, Clone)]
pub struct MockVideoFrame {
    pub stream: usize,
    width: u32,
    height: u32,
    format: FormatId,
    data: Vec<u8>,
    pts: Option<i64>,
}

impl Default for MockVideoFrame {
    fn default() -> Self {
        Self {
            stream: 0,
            width: 0,
            height: 0,
            format: FormatId::NONE,
            data: Vec::new(),
            pts: None,
        }
    }
}

impl MockVideoFrame {
    pub fn solid(stream: usize, width: u32, height: u32, fill: u8) -> Self {
        Self {
            stream,
            width,
            height,
            format: FormatId(0),
            data: vec![fill; (width * height) as usize],
            pts: None,
        }
    }

    fn decode(packet: &MockPacket, stream: usize) -> Result<Self> {
        let p = &packet.payload;
        if p.len() < 6 {
            return Err(PlayerError::decode(INVALID_DATA, "视频负载长度不足"));
        }
        let width = u16::from_le_bytes([p[0], p[1]]) as u32;
        let height = u16::from_le_bytes([p[2], p[3]]) as u32;
        let mut frame = Self::solid(stream, width, height, p[5]);
        frame.format = FormatId(p[4] as i32);
        frame.pts = packet.info.pts.or(packet.info.dts);
        Ok(frame)
    }
}

impl VideoFrame for MockVideoFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> FormatId {
        self.format
    }

    fn plane(&self, index: usize) -> Option<&[u8]> {
        (index == 0 && !self.data.is_empty()).then_some(self.data.as_slice())
    }

    fn stride(&self, index: usize) -> Option<usize> {
        (index == 0 && !self.data.is_empty()).then_some(self.width as usize)
    }

    fn timestamp(&self) -> Option<i64> {
        self.pts
    }
}

#[derive(Debug, Clone)]
pub struct MockAudioFrame {
    pub stream: usize,
    spec: AudioSpec,
    /// 交错采样
    data: Vec<f32>,
    pts: Option<i64>,
}

impl Default for MockAudioFrame {
    fn default() -> Self {
        Self::tone(0, 0, 1, 48_000, None)
    }
}

impl MockAudioFrame {
    pub fn tone(stream: usize, samples: usize, channels: u16, sample_rate: u32, pts: Option<i64>) -> Self {
        Self {
            stream,
            spec: AudioSpec {
                format: FormatId(3),
                channels,
                channel_mask: 0,
                sample_rate,
            },
            data: vec![0.25; samples * channels as usize],
            pts,
        }
    }

    fn decode(packet: &MockPacket, stream: usize) -> Result<Self> {
        let p = &packet.payload;
        if p.len() < 7 {
            return Err(PlayerError::decode(INVALID_DATA, "音频负载长度不足"));
        }
        let samples = u16::from_le_bytes([p[0], p[1]]) as usize;
        let rate = u32::from_le_bytes([p[3], p[4], p[5], p[6]]);
        Ok(Self::tone(stream, samples, p[2] as u16, rate, packet.info.pts))
    }
}

impl AudioFrame for MockAudioFrame {
    fn samples(&self) -> usize {
        self.data.len() / self.spec.channels.max(1) as usize
    }

    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn timestamp(&self) -> Option<i64> {
        self.pts
    }
}

/// 容器读取的中间结果
enum Fill {
    Complete,
    Again,
    Eof,
}

pub struct MockContainer {
    source: ByteSource,
    streams: Vec<StreamInfo>,
    duration_ms: u32,
    data_start: u64,
    /// 未读完的记录
    partial: Vec<u8>,
    /// 读取层的 EOF 标志，追加新数据后清除
    eof_reached: bool,
}

impl MockContainer {
    fn fill(&mut self, want: usize) -> Fill {
        while self.partial.len() < want {
            if self.eof_reached {
                return Fill::Eof;
            }
            let mut chunk = vec![0u8; want - self.partial.len()];
            match self.source.read_into(&mut chunk) {
                ReadOutcome::Read(n) => self.partial.extend_from_slice(&chunk[..n]),
                ReadOutcome::WouldBlock => return Fill::Again,
                ReadOutcome::EndOfStream => {
                    self.eof_reached = true;
                    return Fill::Eof;
                }
            }
        }
        Fill::Complete
    }

    fn parse_record_header(bytes: &[u8]) -> (PacketInfo, usize) {
        let le_i64 = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            match i64::from_le_bytes(raw) {
                NO_TIMESTAMP => None,
                ts => Some(ts),
            }
        };
        let info = PacketInfo {
            stream_index: bytes[0] as usize,
            is_key: bytes[1] & 1 != 0,
            pts: le_i64(2),
            dts: le_i64(10),
            duration: u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as i64,
        };
        let len = u16::from_le_bytes([bytes[22], bytes[23]]) as usize;
        (info, len)
    }

    /// 从数据区开头扫描关键帧，返回目标之前（含）最后一个关键帧的位置
    fn find_keyframe(&mut self, video: usize, target_ms: i64) -> Result<u64> {
        self.source.seek(SeekFrom::Start(self.data_start))?;
        let mut best = self.data_start;

        loop {
            let position = self.source.position();
            let mut header = [0u8; RECORD_HEADER];
            match self.source.read_into(&mut header) {
                ReadOutcome::Read(RECORD_HEADER) => {}
                // 目标之后的数据还没到
                ReadOutcome::WouldBlock => return Err(PlayerError::WouldBlock),
                _ => break,
            }
            let (info, len) = Self::parse_record_header(&header);
            if info.stream_index == video && info.is_key {
                match info.pts {
                    Some(pts) if pts <= target_ms => best = position,
                    Some(_) => break,
                    None => {}
                }
            }
            if self.source.seek(SeekFrom::Current(len as i64)).is_err() {
                break;
            }
        }
        Ok(best)
    }
}

impl Container for MockContainer {
    type Packet = MockPacket;

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        let mut candidates = self.streams.iter().filter(|s| s.kind == kind);
        let first = candidates.clone().next().map(|s| s.index);
        candidates.find(|s| s.is_default).map(|s| s.index).or(first)
    }

    fn read_packet(&mut self, packet: &mut MockPacket) -> Result<PacketStatus> {
        match self.fill(RECORD_HEADER) {
            Fill::Complete => {}
            Fill::Again => return Ok(PacketStatus::Again),
            Fill::Eof => return Ok(PacketStatus::Eof),
        }

        let (info, len) = Self::parse_record_header(&self.partial);
        match self.fill(RECORD_HEADER + len) {
            Fill::Complete => {}
            Fill::Again => return Ok(PacketStatus::Again),
            Fill::Eof => return Ok(PacketStatus::Eof),
        }

        packet.info = info;
        packet.payload.clear();
        packet
            .payload
            .extend_from_slice(&self.partial[RECORD_HEADER..RECORD_HEADER + len]);
        self.partial.clear();
        Ok(PacketStatus::Packet)
    }

    fn seek(&mut self, target_us: i64) -> Result<()> {
        let video = self
            .best_stream(MediaKind::Video)
            .ok_or_else(|| PlayerError::Seek("没有视频流".to_string()))?;
        let origin = self.source.position();
        let position = match self.find_keyframe(video, target_us / 1000) {
            Ok(position) => position,
            Err(e) => {
                // 失败时回到原读取位置，顺序解码不受影响
                let _ = self.source.seek(SeekFrom::Start(origin));
                return Err(e);
            }
        };
        self.source.seek(SeekFrom::Start(position))?;
        self.partial.clear();
        self.eof_reached = false;
        Ok(())
    }

    fn set_seekable(&mut self, seekable: bool) {
        self.source.set_seekable(seekable);
    }

    fn input_appended(&mut self) {
        self.eof_reached = false;
    }

    fn restart_at(&mut self, _position: u64) {
        self.partial.clear();
        self.eof_reached = false;
    }
}

/// 通用的脚本化解码器
///
/// 帧先进入内部队列，队列长度超过 `delay` 才输出（模拟重排序延迟）；
/// 队列达到 `backlog` 时拒收数据包。
pub struct MockDecoder<F> {
    stream: usize,
    queue: VecDeque<F>,
    delay: usize,
    backlog: usize,
    /// 持有帧时拒收数据包，并把一帧提前放出（send 返回积压时 receive 必有帧）
    refuse_while_holding: bool,
    released: usize,
    flushing: bool,
    /// 冲刷后从不报告 EOF
    stuck: bool,
    decode: fn(&MockPacket, usize) -> Result<F>,
}

impl<F> MockDecoder<F> {
    fn new(engine: &MockEngine, stream: usize, delay: usize, decode: fn(&MockPacket, usize) -> Result<F>) -> Self {
        Self {
            stream,
            queue: VecDeque::new(),
            delay,
            backlog: engine.backlog.max(delay + 1),
            refuse_while_holding: engine.refuse_while_holding,
            released: 0,
            flushing: false,
            stuck: engine.stuck_after_flush,
            decode,
        }
    }
}

impl<F> FrameDecoder for MockDecoder<F> {
    type Packet = MockPacket;
    type Frame = F;

    fn send_packet(&mut self, packet: &MockPacket) -> Result<SendStatus> {
        if self.flushing {
            return Err(PlayerError::decode(-541478725, "解码器已进入冲刷状态"));
        }
        if self.queue.len() >= self.backlog {
            return Ok(SendStatus::Backlogged);
        }
        if self.refuse_while_holding && !self.queue.is_empty() && self.released == 0 {
            self.released = 1;
            return Ok(SendStatus::Backlogged);
        }
        let frame = (self.decode)(packet, self.stream)?;
        self.queue.push_back(frame);
        Ok(SendStatus::Accepted)
    }

    fn send_eof(&mut self) -> Result<()> {
        self.flushing = true;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut F) -> Result<ReceiveStatus> {
        if self.queue.len() > self.delay || self.released > 0 || (self.flushing && !self.queue.is_empty()) {
            if let Some(next) = self.queue.pop_front() {
                self.released = self.released.saturating_sub(1);
                *frame = next;
                return Ok(ReceiveStatus::Frame);
            }
        }
        if self.flushing && !self.stuck {
            return Ok(ReceiveStatus::Eof);
        }
        Ok(ReceiveStatus::Again)
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.released = 0;
        self.flushing = false;
    }
}

pub struct MockSubtitleDecoder {
    codec: String,
    header: Option<String>,
}

impl SubtitleDecoder for MockSubtitleDecoder {
    type Packet = MockPacket;

    fn decode(&mut self, packet: &MockPacket) -> Result<Option<DecodedSubtitle>> {
        let p = &packet.payload;
        if p.len() < 4 {
            return Err(PlayerError::decode(INVALID_DATA, "字幕负载长度不足"));
        }
        let end_display_ms = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
        let text = String::from_utf8_lossy(&p[4..]).into_owned();
        if text.is_empty() {
            return Ok(None);
        }

        let rect = if self.codec == "ass" || text.starts_with("Dialogue:") {
            SubtitleRect::Ass(text)
        } else {
            SubtitleRect::Text(text)
        };
        Ok(Some(DecodedSubtitle {
            end_display_ms,
            rects: vec![rect],
        }))
    }

    fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }
}

/// 灰度平面 → RGBA
pub struct MockScaler {
    key: (u32, u32, FormatId),
}

impl MockScaler {
    pub fn for_frame(frame: &MockVideoFrame) -> Self {
        Self {
            key: (frame.width, frame.height, frame.format),
        }
    }
}

impl Scaler for MockScaler {
    type Frame = MockVideoFrame;

    fn scale(&mut self, frame: &MockVideoFrame, image: &mut RgbaImage) -> Result<()> {
        if (frame.width, frame.height, frame.format) != self.key {
            return Err(PlayerError::invalid_state("转换器与帧参数不匹配"));
        }
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let luma = frame.data[(y * frame.width + x) as usize];
            *pixel = Rgba([luma, luma, luma, 255]);
        }
        Ok(())
    }
}

/// 最近邻重采样到立体声 48 kHz
pub struct MockResampler {
    spec: AudioSpec,
}

impl MockResampler {
    pub fn for_frame(frame: &MockAudioFrame) -> Self {
        Self { spec: frame.spec }
    }
}

impl Resampler for MockResampler {
    type Frame = MockAudioFrame;

    fn output_capacity(&mut self, frame: &MockAudioFrame) -> Result<usize> {
        let rate = self.spec.sample_rate.max(1) as u64;
        Ok(((frame.samples() as u64 * OUTPUT_SAMPLE_RATE as u64 + rate - 1) / rate) as usize)
    }

    fn convert(&mut self, frame: &MockAudioFrame, out: &mut [f32]) -> Result<usize> {
        if frame.spec != self.spec {
            return Err(PlayerError::invalid_state("重采样器与帧参数不匹配"));
        }
        let channels = self.spec.channels.max(1) as usize;
        let produced = out.len() / OUTPUT_CHANNELS as usize;
        for i in 0..produced {
            let src = (i as u64 * self.spec.sample_rate as u64 / OUTPUT_SAMPLE_RATE as u64) as usize;
            let value = frame.data.get(src * channels).copied().unwrap_or(0.0);
            out[i * 2] = value;
            out[i * 2 + 1] = value;
        }
        Ok(produced)
    }
}

/// 把每条可见字幕画成底部的一条白线
#[derive(Default)]
pub struct BlockRasterizer {
    pub fonts: Arc<Mutex<Vec<String>>>,
}

impl CueRasterizer for BlockRasterizer {
    fn add_font(&mut self, name: &str, _data: &[u8]) {
        self.fonts.lock().push(name.to_string());
    }

    fn render(&mut self, track: &CueTrack, time_ms: i64, width: u32, height: u32) -> Vec<CueBitmap> {
        track
            .active_at(time_ms)
            .enumerate()
            .map(|(i, _)| {
                let w = width.min(4);
                CueBitmap {
                    x: 0,
                    y: height as i32 - 1 - i as i32,
                    width: w,
                    height: 1,
                    stride: w as usize,
                    coverage: vec![255; w as usize],
                    color: [255, 255, 255],
                    opacity: 255,
                }
            })
            .collect()
    }
}

/// 脚本化引擎
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// 打开解码器时报告不支持的编码
    pub missing_codecs: Vec<String>,
    pub video_delay: usize,
    pub audio_delay: usize,
    pub backlog: usize,
    pub refuse_while_holding: bool,
    pub stuck_after_flush: bool,
    /// 会话创建时自带 `BlockRasterizer`
    pub builtin_rasterizer: bool,
    pub scalers_built: usize,
    pub resamplers_built: usize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            missing_codecs: Vec::new(),
            video_delay: 1,
            audio_delay: 0,
            backlog: 2,
            refuse_while_holding: false,
            stuck_after_flush: false,
            builtin_rasterizer: false,
            scalers_built: 0,
            resamplers_built: 0,
        }
    }
}

impl MockEngine {
    fn check_codec(&self, container: &MockContainer, stream: usize, kind: MediaKind) -> Result<String> {
        let info = container
            .streams
            .get(stream)
            .filter(|s| s.kind == kind)
            .ok_or_else(|| PlayerError::invalid_argument(format!("流 {} 不是{}流", stream, kind.as_str())))?;
        if self.missing_codecs.contains(&info.codec_name) {
            return Err(PlayerError::UnsupportedStream(format!(
                "找不到 {} 解码器",
                info.codec_name
            )));
        }
        Ok(info.codec_name.clone())
    }
}

fn read_exact(source: &mut ByteSource, len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match source.read_into(&mut out[filled..]) {
            ReadOutcome::Read(n) => filled += n,
            ReadOutcome::WouldBlock => return Err(PlayerError::WouldBlock),
            ReadOutcome::EndOfStream => {
                return Err(PlayerError::decode(INVALID_DATA, "容器头不完整"));
            }
        }
    }
    Ok(out)
}

fn read_string(source: &mut ByteSource) -> Result<String> {
    let len = read_exact(source, 1)?[0] as usize;
    Ok(String::from_utf8_lossy(&read_exact(source, len)?).into_owned())
}

impl Engine for MockEngine {
    type Packet = MockPacket;
    type VideoFrame = MockVideoFrame;
    type AudioFrame = MockAudioFrame;
    type Container = MockContainer;
    type VideoDecoder = MockDecoder<MockVideoFrame>;
    type AudioDecoder = MockDecoder<MockAudioFrame>;
    type SubtitleDecoder = MockSubtitleDecoder;
    type Scaler = MockScaler;
    type Resampler = MockResampler;

    fn open_container(
        &mut self,
        mut source: ByteSource,
        format_hint: Option<&str>,
        _config: &SessionConfig,
    ) -> Result<MockContainer> {
        if let Some(hint) = format_hint {
            if hint != "mock" {
                return Err(PlayerError::UnsupportedStream(format!("未知格式: {}", hint)));
            }
        }

        let head = read_exact(&mut source, 9)?;
        if &head[..4] != MAGIC {
            return Err(PlayerError::decode(INVALID_DATA, "无法识别的容器格式"));
        }
        let duration_ms = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

        let mut streams = Vec::new();
        for index in 0..head[8] as usize {
            let flags = read_exact(&mut source, 2)?;
            let codec_name = read_string(&mut source)?;
            let language = read_string(&mut source)?;
            streams.push(StreamInfo {
                index,
                kind: kind_from_code(flags[0]),
                codec_id: codec_id(&codec_name),
                codec_name,
                language: (!language.is_empty()).then_some(language),
                title: None,
                is_default: flags[1] != 0,
                time_base: TIME_BASE,
            });
        }

        let data_start = source.position();
        Ok(MockContainer {
            source,
            streams,
            duration_ms,
            data_start,
            partial: Vec::new(),
            eof_reached: false,
        })
    }

    fn open_video_decoder(&mut self, container: &MockContainer, stream: usize) -> Result<Self::VideoDecoder> {
        self.check_codec(container, stream, MediaKind::Video)?;
        Ok(MockDecoder::new(self, stream, self.video_delay, MockVideoFrame::decode))
    }

    fn open_audio_decoder(&mut self, container: &MockContainer, stream: usize) -> Result<Self::AudioDecoder> {
        self.check_codec(container, stream, MediaKind::Audio)?;
        Ok(MockDecoder::new(self, stream, self.audio_delay, MockAudioFrame::decode))
    }

    fn open_subtitle_decoder(&mut self, container: &MockContainer, stream: usize) -> Result<MockSubtitleDecoder> {
        let codec = self.check_codec(container, stream, MediaKind::Subtitle)?;
        let header = (codec == "ass").then(|| "[Script Info]\nScriptType: v4.00+\n".to_string());
        Ok(MockSubtitleDecoder { codec, header })
    }

    fn new_packet(&self) -> MockPacket {
        MockPacket::default()
    }

    fn new_video_frame(&self) -> MockVideoFrame {
        MockVideoFrame::default()
    }

    fn new_audio_frame(&self) -> MockAudioFrame {
        MockAudioFrame::default()
    }

    fn create_scaler(&mut self, frame: &MockVideoFrame) -> Result<MockScaler> {
        self.scalers_built += 1;
        Ok(MockScaler::for_frame(frame))
    }

    fn create_resampler(&mut self, frame: &MockAudioFrame) -> Result<MockResampler> {
        self.resamplers_built += 1;
        Ok(MockResampler::for_frame(frame))
    }

    fn versions(&self) -> EngineVersions {
        EngineVersions {
            codec: 1,
            format: 2,
            util: 3,
        }
    }

    fn has_decoder(&self, name: &str) -> bool {
        ["h264", "hevc", "aac", "ass", "subrip"].contains(&name)
            && !self.missing_codecs.iter().any(|c| c == name)
    }

    fn cue_rasterizer(&self) -> Option<Box<dyn CueRasterizer>> {
        self.builtin_rasterizer
            .then(|| Box::new(BlockRasterizer::default()) as Box<dyn CueRasterizer>)
    }
}

/// 测试配置：不安装 logger
pub fn test_config() -> SessionConfig {
    SessionConfig {
        init_logger: false,
        ..SessionConfig::default()
    }
}

/// 一次性追加整个文件、标记结束并打开会话
pub fn open_session(engine: MockEngine, bytes: &[u8]) -> Session<MockEngine> {
    let mut session = Session::new(engine, test_config()).unwrap();
    session.append(bytes).unwrap();
    session.set_eof();
    session.open(None).unwrap();
    session
}
