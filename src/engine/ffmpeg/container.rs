use super::decoder::FfmpegPacket;
use super::io::AvioHandle;
use crate::core::{MediaKind, PlayerError, Rational, Result, SessionConfig, StreamInfo, TIME_BASE_US};
use crate::engine::{Container, PacketStatus};
use crate::stream::ByteSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::stream::Disposition;
use ffmpeg_next::media;
use ffmpeg_next::util::error::EAGAIN;
use log::{debug, info};
use std::ffi::{c_int, CString};
use std::ptr;

/// 基于自定义 AVIO 的输入容器
///
/// 字段顺序保证 `input` 先于 `io` 释放。
pub struct FfmpegContainer {
    pub(super) input: ffmpeg::format::context::Input,
    io: AvioHandle,
    streams: Vec<StreamInfo>,
    /// 容器没有总时长时使用的最长流时长（秒）
    stream_duration: f64,
}

fn media_kind(medium: media::Type) -> MediaKind {
    match medium {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        media::Type::Data => MediaKind::Data,
        media::Type::Attachment => MediaKind::Attachment,
        media::Type::Unknown => MediaKind::Unknown,
    }
}

fn media_type(kind: MediaKind) -> media::Type {
    match kind {
        MediaKind::Video => media::Type::Video,
        MediaKind::Audio => media::Type::Audio,
        MediaKind::Subtitle => media::Type::Subtitle,
        MediaKind::Data => media::Type::Data,
        MediaKind::Attachment => media::Type::Attachment,
        MediaKind::Unknown => media::Type::Unknown,
    }
}

/// 总时长：容器级时长有效时直接使用，否则取各流中最长的有效时长
fn resolve_duration(container_us: i64, fallback: f64) -> f64 {
    if container_us > 0 {
        container_us as f64 / TIME_BASE_US as f64
    } else {
        fallback
    }
}

/// 流时长（流时间基）换算为秒，未知或无效时为 `None`
fn stream_seconds(duration: i64, time_base: Rational) -> Option<f64> {
    (duration > 0 && time_base.is_valid()).then(|| time_base.seconds(Some(duration)))
}

pub(super) fn open(source: ByteSource, format_hint: Option<&str>, config: &SessionConfig) -> Result<FfmpegContainer> {
    let mut io = AvioHandle::new(source, config.io_buffer_size)?;

    let input_format = match format_hint.filter(|name| !name.is_empty()) {
        Some(name) => {
            let cname = CString::new(name)
                .map_err(|_| PlayerError::invalid_argument(format!("格式名无效: {:?}", name)))?;
            let format = unsafe { ffi::av_find_input_format(cname.as_ptr()) };
            if format.is_null() {
                return Err(PlayerError::UnsupportedStream(format!("未知容器格式: {}", name)));
            }
            format
        }
        None => ptr::null(),
    };

    let input = unsafe {
        let mut ctx = ffi::avformat_alloc_context();
        if ctx.is_null() {
            return Err(PlayerError::OutOfMemory { requested: 0 });
        }
        (*ctx).pb = io.as_mut_ptr();
        (*ctx).flags |= (ffi::AVFMT_FLAG_CUSTOM_IO | ffi::AVFMT_FLAG_NONBLOCK) as c_int;

        // 失败时 avformat_open_input 会释放 ctx，自定义 IO 留给 io 释放
        let ret = ffi::avformat_open_input(&mut ctx, ptr::null(), input_format, ptr::null_mut());
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }
        ffmpeg::format::context::Input::wrap(ctx)
    };

    let streams: Vec<StreamInfo> = input
        .streams()
        .map(|stream| {
            let parameters = stream.parameters();
            let metadata = stream.metadata();
            let time_base = stream.time_base();
            StreamInfo {
                index: stream.index(),
                kind: media_kind(parameters.medium()),
                codec_id: ffi::AVCodecID::from(parameters.id()) as u32,
                codec_name: parameters.id().name().to_string(),
                language: metadata.get("language").map(str::to_string),
                title: metadata.get("title").map(str::to_string),
                is_default: stream.disposition().contains(Disposition::DEFAULT),
                time_base: Rational::new(time_base.numerator(), time_base.denominator()),
            }
        })
        .collect();

    let stream_duration = input
        .streams()
        .filter_map(|stream| {
            let time_base = stream.time_base();
            stream_seconds(
                stream.duration(),
                Rational::new(time_base.numerator(), time_base.denominator()),
            )
        })
        .fold(0.0, f64::max);

    info!(
        "探测到容器格式: {} ({} 个流)",
        input.format().name(),
        streams.len()
    );
    for stream in &streams {
        debug!(
            "  流 #{}: {} {} 语言 {:?} 默认 {}",
            stream.index,
            stream.kind.as_str(),
            stream.codec_name,
            stream.language,
            stream.is_default
        );
    }

    Ok(FfmpegContainer {
        input,
        io,
        streams,
        stream_duration,
    })
}

impl Container for FfmpegContainer {
    type Packet = FfmpegPacket;

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn duration_seconds(&self) -> f64 {
        resolve_duration(self.input.duration(), self.stream_duration)
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        self.input
            .streams()
            .best(media_type(kind))
            .map(|stream| stream.index())
    }

    fn read_packet(&mut self, packet: &mut FfmpegPacket) -> Result<PacketStatus> {
        unsafe {
            ffi::av_packet_unref(packet.0.as_mut_ptr());
        }
        match packet.0.read(&mut self.input) {
            Ok(()) => Ok(PacketStatus::Packet),
            Err(ffmpeg::Error::Eof) => Ok(PacketStatus::Eof),
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Ok(PacketStatus::Again),
            Err(e) => Err(e.into()),
        }
    }

    fn seek(&mut self, target_us: i64) -> Result<()> {
        let ret = unsafe { ffi::avformat_seek_file(self.input.as_mut_ptr(), -1, i64::MIN, target_us, target_us, 0) };
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }
        Ok(())
    }

    fn set_seekable(&mut self, seekable: bool) {
        self.io.set_seekable(seekable);
    }

    fn input_appended(&mut self) {
        self.io.clear_eof();
    }

    fn restart_at(&mut self, position: u64) {
        self.io.restart_at(position);
    }
}
