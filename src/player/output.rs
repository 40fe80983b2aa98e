use crate::core::{
    AudioSpec, FormatId, PlayerError, Rational, Result, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE,
};
use crate::engine::{AudioFrame, Resampler, Scaler, VideoFrame};
use image::RgbaImage;
use log::debug;

/// RGBA 输出缓存
///
/// 转换器按 (宽, 高, 像素格式) 缓存，只有其中之一变化时才重建。
pub struct VideoOutput<S> {
    scaler: Option<S>,
    key: Option<(u32, u32, FormatId)>,
    image: RgbaImage,
}

impl<S: Scaler> VideoOutput<S>
where
    S::Frame: VideoFrame,
{
    pub fn new() -> Self {
        Self {
            scaler: None,
            key: None,
            image: RgbaImage::new(0, 0),
        }
    }

    /// 把帧转换到缓存的 RGBA 图像
    pub fn convert<F>(&mut self, frame: &S::Frame, create: F) -> Result<&RgbaImage>
    where
        F: FnOnce(&S::Frame) -> Result<S>,
    {
        let key = (frame.width(), frame.height(), frame.format());
        if key.0 == 0 || key.1 == 0 {
            return Err(PlayerError::invalid_state("当前没有可转换的视频帧"));
        }

        if self.key != Some(key) || self.scaler.is_none() {
            self.invalidate();
            let scaler = create(frame)?;
            self.image = RgbaImage::new(key.0, key.1);
            self.scaler = Some(scaler);
            self.key = Some(key);
            debug!("重建 RGBA 转换器: {}x{} {:?}", key.0, key.1, key.2);
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler.scale(frame, &mut self.image)?;
        }
        Ok(&self.image)
    }

    /// 释放转换器和输出缓冲（切换视频流后）
    pub fn invalidate(&mut self) {
        self.scaler = None;
        self.key = None;
        self.image = RgbaImage::new(0, 0);
    }

    /// 最近一次转换的结果
    pub fn image(&self) -> Option<&RgbaImage> {
        self.key.map(|_| &self.image)
    }

    pub fn image_mut(&mut self) -> Option<&mut RgbaImage> {
        match self.key {
            Some(_) => Some(&mut self.image),
            None => None,
        }
    }
}

impl<S: Scaler> Default for VideoOutput<S>
where
    S::Frame: VideoFrame,
{
    fn default() -> Self {
        Self::new()
    }
}

/// 重采样后的一段音频（交错 f32）
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    /// 时间戳未知时为 0.0
    pub pts_seconds: f64,
}

impl AudioChunk {
    fn empty() -> Self {
        Self {
            samples: Vec::new(),
            channels: OUTPUT_CHANNELS,
            sample_rate: OUTPUT_SAMPLE_RATE,
            pts_seconds: 0.0,
        }
    }

    /// 交错采样
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// 每声道采样数
    pub fn sample_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// 音频重采样缓存
///
/// 重采样器按输入参数缓存；输出缓冲每帧按实际需要的大小重新分配。
pub struct AudioOutput<R> {
    resampler: Option<R>,
    key: Option<AudioSpec>,
    chunk: AudioChunk,
    ready: bool,
}

impl<R: Resampler> AudioOutput<R>
where
    R::Frame: AudioFrame,
{
    pub fn new() -> Self {
        Self {
            resampler: None,
            key: None,
            chunk: AudioChunk::empty(),
            ready: false,
        }
    }

    pub fn convert<F>(&mut self, frame: &R::Frame, time_base: Rational, create: F) -> Result<&AudioChunk>
    where
        F: FnOnce(&R::Frame) -> Result<R>,
    {
        let spec = frame.spec();
        if self.key != Some(spec) || self.resampler.is_none() {
            self.invalidate();
            self.resampler = Some(create(frame)?);
            self.key = Some(spec);
            debug!(
                "重建重采样器: {:?} {} 声道 {} Hz -> {} 声道 {} Hz f32",
                spec.format, spec.channels, spec.sample_rate, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE
            );
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Err(PlayerError::invalid_state("重采样器未初始化"));
        };

        self.ready = false;
        let capacity = resampler.output_capacity(frame)?;
        if capacity == 0 {
            return Err(PlayerError::decode(-22, "重采样输出长度为 0"));
        }

        let len = capacity * OUTPUT_CHANNELS as usize;
        let samples = &mut self.chunk.samples;
        samples.clear();
        samples
            .try_reserve_exact(len)
            .map_err(|_| PlayerError::OutOfMemory {
                requested: len * std::mem::size_of::<f32>(),
            })?;
        samples.resize(len, 0.0);

        let converted = resampler.convert(frame, samples)?;
        samples.truncate(converted.min(capacity) * OUTPUT_CHANNELS as usize);

        self.chunk.pts_seconds = time_base.seconds(frame.timestamp());
        self.ready = true;
        Ok(&self.chunk)
    }

    /// 丢弃当前音频数据（关闭音频时）
    pub fn clear(&mut self) {
        self.chunk.samples = Vec::new();
        self.chunk.pts_seconds = 0.0;
        self.ready = false;
    }

    pub fn invalidate(&mut self) {
        self.resampler = None;
        self.key = None;
        self.clear();
    }

    pub fn chunk(&self) -> Option<&AudioChunk> {
        self.ready.then_some(&self.chunk)
    }
}

impl<R: Resampler> Default for AudioOutput<R>
where
    R::Frame: AudioFrame,
{
    fn default() -> Self {
        Self::new()
    }
}
