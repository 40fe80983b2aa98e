use crate::core::{
    logging, EngineVersions, FormatId, MediaKind, PlayerError, Rational, Result, SessionConfig,
    SessionState, StreamInfo, StreamSelection, TIME_BASE_US,
};
use crate::engine::{Container, CueRasterizer, Engine, FrameDecoder, SubtitleDecoder, VideoFrame};
use crate::player::cue::SubtitleFormat;
use crate::player::output::{AudioChunk, AudioOutput, VideoOutput};
use crate::player::scheduler::DrainFlags;
use crate::player::subtitle::SubtitleCompositor;
use crate::stream::{ByteSource, SharedBuffer, StreamBuffer};
use image::RgbaImage;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 已打开的解码器及其所属流
pub(super) struct DecoderSlot<D> {
    pub decoder: D,
    pub stream: usize,
    pub time_base: Rational,
}

/// 可复用的数据包和帧对象
pub(super) struct FrameSet<E: Engine> {
    pub packet: E::Packet,
    /// 最近一次成功解码的视频帧
    pub video: E::VideoFrame,
    /// 取帧目标，成功后与 `video` 交换，失败时当前帧保持有效
    pub video_scratch: E::VideoFrame,
    pub audio: E::AudioFrame,
    pub has_video: bool,
}

impl<E: Engine> FrameSet<E> {
    fn new(engine: &E) -> Self {
        Self {
            packet: engine.new_packet(),
            video: engine.new_video_frame(),
            video_scratch: engine.new_video_frame(),
            audio: engine.new_audio_frame(),
            has_video: false,
        }
    }
}

/// 流式解码会话
///
/// 调用方推入字节、拉取解码单元；会话自身不创建线程，也从不阻塞等待数据。
/// 字段顺序即释放顺序：输出缓存 → 解码器 → 数据包 / 帧 → 容器 → 引擎 → 缓冲。
pub struct Session<E: Engine> {
    pub(super) video_output: VideoOutput<E::Scaler>,
    pub(super) audio_output: AudioOutput<E::Resampler>,
    pub(super) compositor: SubtitleCompositor,
    pub(super) video: Option<DecoderSlot<E::VideoDecoder>>,
    pub(super) audio: Option<DecoderSlot<E::AudioDecoder>>,
    pub(super) subtitle: Option<DecoderSlot<E::SubtitleDecoder>>,
    pub(super) frames: Option<FrameSet<E>>,
    pub(super) container: Option<E::Container>,
    pub(super) engine: E,
    pub(super) buffer: SharedBuffer,
    pub(super) flags: DrainFlags,
    pub(super) config: SessionConfig,
    pub(super) audio_enabled: bool,
    pub(super) subtitles_enabled: bool,
    state: SessionState,
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E, config: SessionConfig) -> Result<Self> {
        if config.init_logger {
            logging::init_once(&config.log_level);
        }

        let buffer = StreamBuffer::new(config.initial_capacity, &config)?;
        let mut compositor = SubtitleCompositor::new(config.subtitle_fallback_ms);
        if let Some(rasterizer) = engine.cue_rasterizer() {
            compositor.set_rasterizer(rasterizer);
        }
        info!(
            "创建会话: 初始容量 {} 字节, 内存上限 {} 字节, 字幕光栅化器 {}",
            config.initial_capacity,
            config.buffer_limit,
            if compositor.has_rasterizer() { "已安装" } else { "未安装" }
        );

        Ok(Self {
            video_output: VideoOutput::new(),
            audio_output: AudioOutput::new(),
            compositor,
            video: None,
            audio: None,
            subtitle: None,
            frames: None,
            container: None,
            engine,
            buffer: Arc::new(Mutex::new(buffer)),
            flags: DrainFlags::default(),
            config,
            audio_enabled: false,
            subtitles_enabled: false,
            state: SessionState::Closed,
        })
    }

    // ---- 生命周期 ----

    /// 探测容器并打开默认的视频 / 音频解码器
    ///
    /// 数据不足时返回 `WouldBlock`，缓冲原样保留，追加字节后可直接重试。
    /// 已打开时什么也不做。
    pub fn open(&mut self, format_hint: Option<&str>) -> Result<()> {
        if self.state == SessionState::Open {
            return Ok(());
        }

        self.state = SessionState::Opening;
        {
            let mut buffer = self.buffer.lock();
            buffer.rewind();
            buffer.set_keep_all(true);
        }

        match self.try_open(format_hint) {
            Ok(()) => {
                self.state = SessionState::Open;
                Ok(())
            }
            Err(e) => {
                self.teardown();
                match &e {
                    PlayerError::WouldBlock => debug!("探测数据不足，等待更多字节"),
                    other => warn!("打开容器失败: {}", other),
                }
                Err(e)
            }
        }
    }

    fn try_open(&mut self, format_hint: Option<&str>) -> Result<()> {
        let source = ByteSource::new(self.buffer.clone());
        let mut container = self.engine.open_container(source, format_hint, &self.config)?;

        let video_index = container
            .best_stream(MediaKind::Video)
            .ok_or_else(|| PlayerError::UnsupportedStream("容器中没有视频流".to_string()))?;
        let video = self.engine.open_video_decoder(&container, video_index)?;
        let video = DecoderSlot {
            decoder: video,
            stream: video_index,
            time_base: time_base_of(&container, video_index),
        };

        let audio = match container.best_stream(MediaKind::Audio) {
            Some(index) => match self.engine.open_audio_decoder(&container, index) {
                Ok(decoder) => Some(DecoderSlot {
                    decoder,
                    stream: index,
                    time_base: time_base_of(&container, index),
                }),
                Err(e) => {
                    warn!("音频流 {} 无法解码，仅播放视频: {}", index, e);
                    None
                }
            },
            None => None,
        };

        container.set_seekable(true);
        self.buffer.lock().set_keep_all(false);

        info!(
            "容器已打开: {} 个流, 时长 {:.3} 秒, 视频流 {}, 音频流 {:?}",
            container.streams().len(),
            container.duration_seconds(),
            video_index,
            audio.as_ref().map(|slot| slot.stream)
        );

        self.frames = Some(FrameSet::new(&self.engine));
        self.audio_enabled = audio.is_some();
        self.video = Some(video);
        self.audio = audio;
        self.container = Some(container);
        self.reset_flags();
        Ok(())
    }

    /// 关闭所有解码资源，缓冲保留
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!("关闭会话");
        }
        self.teardown();
        self.compositor.rebuild(None);
        self.subtitles_enabled = false;
    }

    fn teardown(&mut self) {
        self.video_output.invalidate();
        self.audio_output.invalidate();
        self.video = None;
        self.audio = None;
        self.subtitle = None;
        self.frames = None;
        self.container = None;
        self.flags = DrainFlags::default();
        self.audio_enabled = false;
        self.state = SessionState::Closed;
    }

    pub(super) fn require_open(&self) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(PlayerError::invalid_state("会话尚未打开"));
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    // ---- 数据输入 ----

    /// 追加字节，返回接收的字节数
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        let accepted = self.buffer.lock().append(bytes)?;
        if accepted > 0 {
            if let Some(container) = self.container.as_mut() {
                container.input_appended();
            }
        }
        Ok(accepted)
    }

    /// 生产者不会再追加数据
    pub fn set_eof(&mut self) {
        self.buffer.lock().set_eof();
        debug!("输入已结束");
    }

    pub fn set_keep_all(&mut self, enabled: bool) {
        self.buffer.lock().set_keep_all(enabled);
    }

    pub fn set_buffer_limit(&mut self, bytes: usize) {
        self.buffer.lock().set_limit(bytes);
    }

    pub fn set_known_file_size(&mut self, size: Option<u64>) {
        self.buffer.lock().set_total_size(size);
    }

    pub fn set_buffer_offset(&mut self, offset: u64) {
        self.buffer.lock().set_offset(offset);
    }

    // ---- 流选择与控制 ----

    /// 重新选择视频流和音频流
    ///
    /// 先打开新的解码器再替换旧的，失败时保持原来的选择。
    pub fn select_streams(&mut self, video: StreamSelection, audio: StreamSelection) -> Result<()> {
        self.require_open()?;
        let container = opened(&self.container)?;

        let video_index = match video {
            StreamSelection::Auto => container
                .best_stream(MediaKind::Video)
                .ok_or_else(|| PlayerError::UnsupportedStream("容器中没有视频流".to_string()))?,
            StreamSelection::Disabled => {
                return Err(PlayerError::invalid_argument("视频流不能禁用"));
            }
            StreamSelection::Index(index) => check_kind(container, index, MediaKind::Video)?,
        };
        let audio_index = match audio {
            StreamSelection::Auto => container.best_stream(MediaKind::Audio),
            StreamSelection::Disabled => None,
            StreamSelection::Index(index) => Some(check_kind(container, index, MediaKind::Audio)?),
        };

        let decoder = self.engine.open_video_decoder(container, video_index)?;
        self.video = Some(DecoderSlot {
            decoder,
            stream: video_index,
            time_base: time_base_of(container, video_index),
        });
        self.video_output.invalidate();
        self.flags.video_eof = false;
        self.flags.video_flush_sent = false;
        if self.flags.pending == Some(MediaKind::Video) {
            self.flags.pending = None;
        }
        info!("切换视频流: {}", video_index);

        match audio_index {
            Some(index) => {
                let decoder = self.engine.open_audio_decoder(container, index)?;
                self.audio = Some(DecoderSlot {
                    decoder,
                    stream: index,
                    time_base: time_base_of(container, index),
                });
                self.audio_output.invalidate();
                self.audio_enabled = true;
                self.flags.audio_eof = false;
                self.flags.audio_flush_sent = false;
                info!("切换音频流: {}", index);
            }
            None => {
                self.audio = None;
                self.audio_output.invalidate();
                self.audio_enabled = false;
                self.flags.audio_eof = true;
                self.flags.audio_flush_sent = true;
                info!("音频已关闭");
            }
        }
        if self.flags.pending == Some(MediaKind::Audio) {
            self.flags.pending = None;
        }
        Ok(())
    }

    /// 选择字幕流，并用新流的私有头重建字幕时间线
    pub fn select_subtitle_stream(&mut self, selection: StreamSelection) -> Result<()> {
        self.require_open()?;
        let container = opened(&self.container)?;

        let target = match selection {
            StreamSelection::Auto => container.best_stream(MediaKind::Subtitle),
            StreamSelection::Disabled => None,
            StreamSelection::Index(index) => {
                Some(check_kind(container, index, MediaKind::Subtitle)?)
            }
        };

        match target {
            Some(index) => {
                let decoder = self.engine.open_subtitle_decoder(container, index)?;
                self.compositor.rebuild(decoder.header().map(str::to_string));
                self.subtitle = Some(DecoderSlot {
                    decoder,
                    stream: index,
                    time_base: time_base_of(container, index),
                });
                self.subtitles_enabled = true;
                info!("启用字幕流: {}", index);
            }
            None => {
                self.subtitle = None;
                self.compositor.rebuild(None);
                self.subtitles_enabled = false;
                info!("字幕已关闭");
            }
        }
        Ok(())
    }

    /// 开关音频；关闭后音频视为已排空
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled && self.audio.is_some();
        if let Some(slot) = self.audio.as_mut() {
            slot.decoder.flush();
        }
        if self.flags.pending == Some(MediaKind::Audio) {
            self.flags.pending = None;
        }

        if self.audio_enabled {
            self.flags.audio_eof = false;
            self.flags.audio_flush_sent = false;
        } else {
            self.audio_output.clear();
            self.flags.audio_eof = true;
            self.flags.audio_flush_sent = true;
        }
        debug!("音频输出: {}", if self.audio_enabled { "开" } else { "关" });
    }

    /// 定位到 `seconds` 之前（含）最近的关键帧
    ///
    /// 目标不在缓冲中、或容器拒绝定位时一律返回 `Seek`（包括读到缓冲边缘的
    /// `WouldBlock`），调用方应改为 `prepare_restream`。
    pub fn seek_seconds(&mut self, seconds: f64) -> Result<()> {
        self.require_open()?;
        if seconds.is_nan() {
            return Err(PlayerError::invalid_argument("Seek 目标不是数字"));
        }

        let target_us = (seconds.max(0.0) * TIME_BASE_US as f64) as i64;
        let Some(container) = self.container.as_mut() else {
            return Err(PlayerError::invalid_state("容器未打开"));
        };
        container.seek(target_us).map_err(|e| match e {
            PlayerError::Seek(_) => e,
            PlayerError::WouldBlock => PlayerError::Seek("目标位置尚未缓冲".to_string()),
            other => PlayerError::Seek(other.to_string()),
        })?;

        self.flush_decoders();
        self.reset_flags();
        if self.config.reset_cues_on_seek {
            self.compositor.reset();
        }
        debug!("Seek 到 {:.3} 秒", seconds.max(0.0));
        Ok(())
    }

    /// 丢弃缓冲，准备从 `offset` 重新推流
    pub fn prepare_restream(&mut self, offset: u64) -> Result<()> {
        self.require_open()?;
        self.flush_decoders();
        self.buffer.lock().restart_at(offset);
        if let Some(container) = self.container.as_mut() {
            container.restart_at(offset);
        }
        self.reset_flags();
        if self.config.reset_cues_on_seek {
            self.compositor.reset();
        }
        info!("准备从字节 {} 重新推流", offset);
        Ok(())
    }

    fn flush_decoders(&mut self) {
        if let Some(slot) = self.video.as_mut() {
            slot.decoder.flush();
        }
        if let Some(slot) = self.audio.as_mut() {
            slot.decoder.flush();
        }
    }

    fn reset_flags(&mut self) {
        let audio_active = self.audio_active();
        self.flags.reset(audio_active);
    }

    pub(super) fn audio_active(&self) -> bool {
        self.audio_enabled && self.audio.is_some()
    }

    // ---- 流信息 ----

    /// 总时长（秒），未知时为 0.0
    pub fn duration_seconds(&self) -> f64 {
        self.container
            .as_ref()
            .map_or(0.0, |container| container.duration_seconds())
    }

    pub fn streams_count(&self) -> usize {
        self.container
            .as_ref()
            .map_or(0, |container| container.streams().len())
    }

    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.container.as_ref()?.streams().get(index)
    }

    pub fn selected_video_stream(&self) -> Option<usize> {
        self.video.as_ref().map(|slot| slot.stream)
    }

    pub fn selected_audio_stream(&self) -> Option<usize> {
        self.audio.as_ref().map(|slot| slot.stream)
    }

    pub fn selected_subtitle_stream(&self) -> Option<usize> {
        self.subtitle.as_ref().map(|slot| slot.stream)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_active()
    }

    pub fn subtitles_enabled(&self) -> bool {
        self.subtitles_enabled
    }

    // ---- 视频帧 ----

    pub fn video_frame(&self) -> Option<&E::VideoFrame> {
        self.frames
            .as_ref()
            .filter(|frames| frames.has_video)
            .map(|frames| &frames.video)
    }

    pub fn video_width(&self) -> u32 {
        self.video_frame().map_or(0, |frame| frame.width())
    }

    pub fn video_height(&self) -> u32 {
        self.video_frame().map_or(0, |frame| frame.height())
    }

    pub fn pixel_format(&self) -> FormatId {
        self.video_frame().map_or(FormatId::NONE, |frame| frame.format())
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.video_frame()?.plane(index)
    }

    pub fn stride(&self, index: usize) -> Option<usize> {
        self.video_frame()?.stride(index)
    }

    /// 当前帧时间（秒），时间戳未知时为 0.0
    pub fn video_pts_seconds(&self) -> f64 {
        match (self.video_frame(), self.video.as_ref()) {
            (Some(frame), Some(slot)) => slot.time_base.seconds(frame.timestamp()),
            _ => 0.0,
        }
    }

    /// 把当前视频帧转换为 RGBA
    pub fn convert_to_rgba(&mut self) -> Result<&RgbaImage> {
        let frame = match self.frames.as_ref() {
            Some(frames) if frames.has_video => &frames.video,
            _ => return Err(PlayerError::invalid_state("当前没有视频帧")),
        };
        let engine = &mut self.engine;
        self.video_output.convert(frame, |f| engine.create_scaler(f))
    }

    /// 最近一次 RGBA 转换的结果
    pub fn rgba(&self) -> Option<&RgbaImage> {
        self.video_output.image()
    }

    // ---- 音频 ----

    pub fn audio_chunk(&self) -> Option<&AudioChunk> {
        self.audio_output.chunk()
    }

    // ---- 字幕 ----

    pub fn add_embedded_font(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(PlayerError::invalid_argument("字体数据为空"));
        }
        self.compositor.add_font(name, data);
        Ok(())
    }

    /// 安装字形光栅化器（替换引擎自带的）；之前添加的字体会一并转交
    pub fn set_cue_rasterizer(&mut self, rasterizer: Box<dyn CueRasterizer>) {
        self.compositor.set_rasterizer(rasterizer);
    }

    pub fn has_cue_rasterizer(&self) -> bool {
        self.compositor.has_rasterizer()
    }

    /// 在最近一次 RGBA 帧上叠加 `pts_seconds` 时刻的字幕，返回图像是否变化
    pub fn render_subtitles(&mut self, pts_seconds: f64) -> Result<bool> {
        if !self.subtitles_enabled {
            return Ok(false);
        }
        let Some(image) = self.video_output.image_mut() else {
            return Err(PlayerError::invalid_state("请先转换 RGBA 帧"));
        };
        Ok(self.compositor.render(image, pts_seconds))
    }

    pub fn cue_count(&self) -> usize {
        self.compositor.track().len()
    }

    pub fn first_cue_timing(&self) -> Option<(i64, i64)> {
        self.compositor.track().first_timing()
    }

    pub fn clear_cue_track(&mut self) {
        self.compositor.reset();
    }

    /// 导入外部字幕文本（由调用方读取），返回新增条数
    pub fn import_cues(&mut self, text: &str, format: SubtitleFormat) -> Result<usize> {
        let added = self.compositor.track_mut().import(text, format)?;
        self.subtitles_enabled = true;
        info!("导入外部字幕 {:?}: {} 条", format, added);
        Ok(added)
    }

    // ---- 诊断 ----

    pub fn versions(&self) -> EngineVersions {
        self.engine.versions()
    }

    pub fn has_decoder(&self, name: &str) -> bool {
        self.engine.has_decoder(name)
    }

    pub fn supports_hevc_av1(&self) -> bool {
        self.engine.has_decoder("hevc") && self.engine.has_decoder("av1")
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().buffered_bytes()
    }

    pub fn compact_buffer(&mut self) {
        self.buffer.lock().compact();
    }

    pub fn shared_buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        debug!("销毁会话 (状态 {:?})", self.state);
    }
}

fn opened<C>(container: &Option<C>) -> Result<&C> {
    container
        .as_ref()
        .ok_or_else(|| PlayerError::invalid_state("容器未打开"))
}

fn time_base_of<C: Container>(container: &C, index: usize) -> Rational {
    container
        .streams()
        .get(index)
        .map(|stream| stream.time_base)
        .unwrap_or_default()
}

fn check_kind<C: Container>(container: &C, index: usize, kind: MediaKind) -> Result<usize> {
    match container.streams().get(index) {
        Some(stream) if stream.kind == kind => Ok(index),
        Some(stream) => Err(PlayerError::invalid_argument(format!(
            "流 {} 是{}流，不是{}流",
            index,
            stream.kind.as_str(),
            kind.as_str()
        ))),
        None => Err(PlayerError::invalid_argument(format!("流索引 {} 超出范围", index))),
    }
}
