use super::container::FfmpegContainer;
use crate::core::{AudioSpec, FormatId, MediaKind, PlayerError, Result};
use crate::engine::{
    AudioFrame, Container, DecodedSubtitle, FrameDecoder, Packet, PacketInfo, ReceiveStatus,
    SendStatus, SubtitleDecoder, SubtitleRect, VideoFrame,
};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, decoder, subtitle::Rect};
use ffmpeg_next::ffi;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::util::frame;
use log::{debug, trace};
use std::marker::PhantomData;
use std::ops::DerefMut;
use std::slice;

pub struct FfmpegPacket(pub(super) ffmpeg::Packet);

impl Packet for FfmpegPacket {
    fn info(&self) -> PacketInfo {
        PacketInfo {
            stream_index: self.0.stream(),
            pts: self.0.pts(),
            dts: self.0.dts(),
            duration: self.0.duration(),
            is_key: self.0.is_key(),
        }
    }
}

pub struct FfmpegVideoFrame(pub(super) frame::Video);

impl VideoFrame for FfmpegVideoFrame {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }

    fn format(&self) -> FormatId {
        FormatId(ffi::AVPixelFormat::from(self.0.format()) as i32)
    }

    fn plane(&self, index: usize) -> Option<&[u8]> {
        (index < self.0.planes()).then(|| self.0.data(index))
    }

    fn stride(&self, index: usize) -> Option<usize> {
        (index < self.0.planes()).then(|| self.0.stride(index))
    }

    fn timestamp(&self) -> Option<i64> {
        self.0.timestamp()
    }
}

pub struct FfmpegAudioFrame(pub(super) frame::Audio);

impl AudioFrame for FfmpegAudioFrame {
    fn samples(&self) -> usize {
        self.0.samples()
    }

    fn spec(&self) -> AudioSpec {
        AudioSpec {
            format: FormatId(ffi::AVSampleFormat::from(self.0.format()) as i32),
            channels: self.0.channels(),
            channel_mask: self.0.channel_layout().bits(),
            sample_rate: self.0.rate(),
        }
    }

    fn timestamp(&self) -> Option<i64> {
        self.0.timestamp()
    }
}

/// 解码器写入的帧对象
pub trait RawFrame {
    fn raw_mut(&mut self) -> &mut frame::Frame;
}

impl RawFrame for FfmpegVideoFrame {
    fn raw_mut(&mut self) -> &mut frame::Frame {
        &mut self.0
    }
}

impl RawFrame for FfmpegAudioFrame {
    fn raw_mut(&mut self) -> &mut frame::Frame {
        &mut self.0
    }
}

/// 送包 / 取帧解码器（视频和音频共用）
pub struct FfmpegDecoder<D, F> {
    inner: D,
    _frame: PhantomData<F>,
}

pub type FfmpegVideoDecoder = FfmpegDecoder<decoder::Video, FfmpegVideoFrame>;
pub type FfmpegAudioDecoder = FfmpegDecoder<decoder::Audio, FfmpegAudioFrame>;

impl<D, F> FrameDecoder for FfmpegDecoder<D, F>
where
    D: DerefMut<Target = decoder::Opened>,
    F: RawFrame,
{
    type Packet = FfmpegPacket;
    type Frame = F;

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<SendStatus> {
        match self.inner.send_packet(&packet.0) {
            Ok(()) => Ok(SendStatus::Accepted),
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Ok(SendStatus::Backlogged),
            Err(e) => Err(e.into()),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.inner.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn receive_frame(&mut self, frame: &mut F) -> Result<ReceiveStatus> {
        match self.inner.receive_frame(frame.raw_mut()) {
            Ok(()) => Ok(ReceiveStatus::Frame),
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Ok(ReceiveStatus::Again),
            Err(ffmpeg::Error::Eof) => Ok(ReceiveStatus::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) {
        self.inner.flush();
    }
}

/// 按流参数创建解码上下文；内部多线程关闭
fn codec_context(container: &FfmpegContainer, index: usize, kind: MediaKind) -> Result<codec::context::Context> {
    match container.streams().get(index) {
        Some(info) if info.kind == kind => {}
        _ => {
            return Err(PlayerError::invalid_argument(format!(
                "流 {} 不是{}流",
                index,
                kind.as_str()
            )))
        }
    }
    let stream = container
        .input
        .stream(index)
        .ok_or_else(|| PlayerError::invalid_argument(format!("流索引 {} 超出范围", index)))?;

    let mut context = codec::context::Context::from_parameters(stream.parameters())?;
    unsafe {
        let raw = context.as_mut_ptr();
        (*raw).thread_count = 1;
        (*raw).thread_type = 0;
        (*raw).pkt_timebase = stream.time_base().into();
    }
    Ok(context)
}

pub(super) fn open_video(container: &FfmpegContainer, index: usize) -> Result<FfmpegVideoDecoder> {
    let decoder = codec_context(container, index, MediaKind::Video)?.decoder().video()?;
    debug!(
        "视频解码器: 流 {}, {}x{}, 格式 {:?}",
        index,
        decoder.width(),
        decoder.height(),
        decoder.format()
    );
    Ok(FfmpegDecoder {
        inner: decoder,
        _frame: PhantomData,
    })
}

pub(super) fn open_audio(container: &FfmpegContainer, index: usize) -> Result<FfmpegAudioDecoder> {
    let decoder = codec_context(container, index, MediaKind::Audio)?.decoder().audio()?;
    debug!(
        "音频解码器: 流 {}, {} Hz, {} 声道, 格式 {:?}",
        index,
        decoder.rate(),
        decoder.channels(),
        decoder.format()
    );
    Ok(FfmpegDecoder {
        inner: decoder,
        _frame: PhantomData,
    })
}

/// 字幕解码器，保存编解码器私有头（ASS 的 `[Script Info]` 等段落）
pub struct FfmpegSubtitleDecoder {
    inner: decoder::Subtitle,
    header: Option<String>,
}

pub(super) fn open_subtitle(container: &FfmpegContainer, index: usize) -> Result<FfmpegSubtitleDecoder> {
    let inner = codec_context(container, index, MediaKind::Subtitle)?
        .decoder()
        .subtitle()?;

    let header = unsafe {
        let raw = inner.as_ptr();
        let data = (*raw).subtitle_header;
        let size = (*raw).subtitle_header_size;
        if data.is_null() || size <= 0 {
            None
        } else {
            let bytes = slice::from_raw_parts(data, size as usize);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    };
    debug!(
        "字幕解码器: 流 {}, 私有头 {} 字节",
        index,
        header.as_ref().map_or(0, |h| h.len())
    );

    Ok(FfmpegSubtitleDecoder { inner, header })
}

impl SubtitleDecoder for FfmpegSubtitleDecoder {
    type Packet = FfmpegPacket;

    fn decode(&mut self, packet: &FfmpegPacket) -> Result<Option<DecodedSubtitle>> {
        let mut subtitle = codec::subtitle::Subtitle::default();
        if !self.inner.decode(&packet.0, &mut subtitle)? {
            return Ok(None);
        }

        let mut rects = Vec::new();
        for rect in subtitle.rects() {
            match rect {
                Rect::Ass(ass) => rects.push(SubtitleRect::Ass(ass.get().to_string())),
                Rect::Text(text) => rects.push(SubtitleRect::Text(text.get().to_string())),
                Rect::Bitmap(_) => trace!("跳过位图字幕"),
                Rect::None(_) => {}
            }
        }
        let decoded = DecodedSubtitle {
            end_display_ms: subtitle.end(),
            rects,
        };

        unsafe {
            ffi::avsubtitle_free(subtitle.as_mut_ptr());
        }
        Ok(Some(decoded))
    }

    fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }
}
