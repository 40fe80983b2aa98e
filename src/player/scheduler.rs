use crate::core::{MediaKind, PlayerError, Result, Unit};
use crate::engine::{Container, Engine, FrameDecoder, Packet, PacketStatus, ReceiveStatus, SendStatus, SubtitleDecoder};
use crate::player::session::Session;
use log::{debug, trace, warn};

/// AVERROR(EAGAIN)
const AGAIN: i32 = -11;

/// 排空状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct DrainFlags {
    /// 容器已读到结尾
    pub draining: bool,
    pub video_eof: bool,
    pub audio_eof: bool,
    pub video_flush_sent: bool,
    pub audio_flush_sent: bool,
    /// 被解码器拒收、等待重新送入的数据包
    pub pending: Option<MediaKind>,
    pub last_unit: Option<Unit>,
}

impl DrainFlags {
    /// Seek / 重新推流之后的初始状态；未启用的音频直接视为已排空
    pub fn reset(&mut self, audio_active: bool) {
        *self = Self::default();
        if !audio_active {
            self.audio_eof = true;
            self.audio_flush_sent = true;
        }
    }
}

impl<E: Engine> Session<E> {
    /// 拉取下一个解码单元
    ///
    /// 先取出解码器中已有的帧，没有时才从容器读包；缓冲暂时没有数据时返回
    /// `NoDataYet`，所有启用的流都排空后返回 `EndOfStream`。从不阻塞。
    pub fn read_next_unit(&mut self) -> Result<Unit> {
        self.require_open()?;
        let mut eof_hits = 0;

        loop {
            if let Some(unit) = self.drain_decoded()? {
                return Ok(unit);
            }
            if self.flags.draining && self.streams_exhausted() {
                return Ok(Unit::EndOfStream);
            }

            if let Some(kind) = self.flags.pending {
                match self.submit(kind)? {
                    SendStatus::Accepted => {
                        self.flags.pending = None;
                        continue;
                    }
                    SendStatus::Backlogged => {
                        return Err(PlayerError::decode(AGAIN, "解码器拒收数据包且没有可取出的帧"));
                    }
                }
            }

            let status = {
                let (Some(container), Some(frames)) = (self.container.as_mut(), self.frames.as_mut()) else {
                    return Err(PlayerError::invalid_state("容器未打开"));
                };
                match container.read_packet(&mut frames.packet) {
                    Ok(status) => status,
                    Err(PlayerError::WouldBlock) => PacketStatus::Again,
                    Err(e) => return Err(e),
                }
            };

            match status {
                PacketStatus::Again => return Ok(Unit::NoDataYet),
                PacketStatus::Eof => {
                    eof_hits += 1;
                    if self.flags.draining && eof_hits > 1 {
                        warn!("冲刷后解码器仍未报告结束，强制结束剩余的流");
                        self.flags.video_eof = true;
                        self.flags.audio_eof = true;
                        continue;
                    }
                    self.begin_draining();
                }
                PacketStatus::Packet => self.dispatch_packet()?,
            }
        }
    }

    /// 拉取下一帧视频，中间的音频单元被丢弃
    pub fn read_next_video_frame(&mut self) -> Result<Unit> {
        loop {
            match self.read_next_unit()? {
                Unit::AudioChunk => continue,
                other => return Ok(other),
            }
        }
    }

    /// 从解码器取帧；上一个单元是音频时先取视频，否则先取音频
    fn drain_decoded(&mut self) -> Result<Option<Unit>> {
        let unit = if self.flags.last_unit == Some(Unit::AudioChunk) {
            match self.receive_video()? {
                Some(unit) => Some(unit),
                None => self.receive_audio()?,
            }
        } else {
            match self.receive_audio()? {
                Some(unit) => Some(unit),
                None => self.receive_video()?,
            }
        };

        if unit.is_some() {
            self.flags.last_unit = unit;
        }
        Ok(unit)
    }

    fn receive_video(&mut self) -> Result<Option<Unit>> {
        if self.flags.video_eof {
            return Ok(None);
        }
        let (Some(slot), Some(frames)) = (self.video.as_mut(), self.frames.as_mut()) else {
            return Ok(None);
        };

        match slot.decoder.receive_frame(&mut frames.video_scratch)? {
            ReceiveStatus::Frame => {
                std::mem::swap(&mut frames.video, &mut frames.video_scratch);
                frames.has_video = true;
                Ok(Some(Unit::VideoFrame))
            }
            ReceiveStatus::Again => Ok(None),
            ReceiveStatus::Eof => {
                debug!("视频解码器已排空");
                self.flags.video_eof = true;
                Ok(None)
            }
        }
    }

    fn receive_audio(&mut self) -> Result<Option<Unit>> {
        if self.flags.audio_eof || !self.audio_active() {
            return Ok(None);
        }
        let (Some(slot), Some(frames)) = (self.audio.as_mut(), self.frames.as_mut()) else {
            return Ok(None);
        };

        match slot.decoder.receive_frame(&mut frames.audio)? {
            ReceiveStatus::Frame => {
                let engine = &mut self.engine;
                self.audio_output
                    .convert(&frames.audio, slot.time_base, |f| engine.create_resampler(f))?;
                Ok(Some(Unit::AudioChunk))
            }
            ReceiveStatus::Again => Ok(None),
            ReceiveStatus::Eof => {
                debug!("音频解码器已排空");
                self.flags.audio_eof = true;
                Ok(None)
            }
        }
    }

    fn streams_exhausted(&self) -> bool {
        let video_done = self.flags.video_eof || self.video.is_none();
        let audio_done = self.flags.audio_eof || !self.audio_active();
        video_done && audio_done
    }

    /// 容器读到结尾：向每个解码器发送一次冲刷信号
    fn begin_draining(&mut self) {
        if !self.flags.draining {
            debug!("容器读取结束，开始冲刷解码器");
        }
        self.flags.draining = true;

        if !self.flags.video_flush_sent {
            self.flags.video_flush_sent = true;
            if let Some(slot) = self.video.as_mut() {
                if let Err(e) = slot.decoder.send_eof() {
                    warn!("视频解码器冲刷失败: {}", e);
                }
            }
        }

        if !self.flags.audio_flush_sent && self.audio_active() {
            self.flags.audio_flush_sent = true;
            if let Some(slot) = self.audio.as_mut() {
                if let Err(e) = slot.decoder.send_eof() {
                    warn!("音频解码器冲刷失败: {}", e);
                }
            }
        }
    }

    /// 按流分发刚读到的数据包
    fn dispatch_packet(&mut self) -> Result<()> {
        let Some(frames) = self.frames.as_ref() else {
            return Ok(());
        };
        let stream = frames.packet.info().stream_index;

        let kind = if self.video.as_ref().is_some_and(|slot| slot.stream == stream) {
            MediaKind::Video
        } else if self.audio.as_ref().is_some_and(|slot| slot.stream == stream) {
            if !self.audio_active() {
                return Ok(());
            }
            MediaKind::Audio
        } else if self.subtitle.as_ref().is_some_and(|slot| slot.stream == stream) {
            self.ingest_subtitle();
            return Ok(());
        } else {
            trace!("丢弃未选中流 {} 的数据包", stream);
            return Ok(());
        };

        if self.submit(kind)? == SendStatus::Backlogged {
            trace!("解码器积压，{}数据包稍后重新送入", kind.as_str());
            self.flags.pending = Some(kind);
        }
        Ok(())
    }

    fn submit(&mut self, kind: MediaKind) -> Result<SendStatus> {
        let Some(frames) = self.frames.as_ref() else {
            return Ok(SendStatus::Accepted);
        };
        match kind {
            MediaKind::Video => match self.video.as_mut() {
                Some(slot) => slot.decoder.send_packet(&frames.packet),
                None => Ok(SendStatus::Accepted),
            },
            MediaKind::Audio => match self.audio.as_mut() {
                Some(slot) => slot.decoder.send_packet(&frames.packet),
                None => Ok(SendStatus::Accepted),
            },
            _ => Ok(SendStatus::Accepted),
        }
    }

    /// 字幕包直接解码进时间线，解码失败的包被忽略
    fn ingest_subtitle(&mut self) {
        if !self.subtitles_enabled {
            return;
        }
        let (Some(slot), Some(frames)) = (self.subtitle.as_mut(), self.frames.as_ref()) else {
            return;
        };

        let info = frames.packet.info();
        match slot.decoder.decode(&frames.packet) {
            Ok(Some(decoded)) => {
                self.compositor.ingest(decoded, &info, slot.time_base);
            }
            Ok(None) => {}
            Err(e) => debug!("字幕包解码失败，已忽略: {}", e),
        }
    }
}
