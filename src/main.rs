//! 命令行探测工具：把本地文件分块喂给解码会话，模拟渐进式下载
//!
//! 用法: myy-stream-probe <媒体文件> [分块字节数] [外挂字幕文件] [字体文件]
//!
//! 外挂字幕文件写 `-` 时使用容器内嵌的字幕流。

use anyhow::{bail, Context, Result};
use log::{info, warn};
use myy_stream::{
    FfmpegEngine, PlayerError, Session, SessionConfig, StreamSelection, SubtitleFormat, Unit,
};
use std::fs;
use std::path::Path;

const DEFAULT_CHUNK: usize = 256 * 1024;

#[derive(Debug, Default)]
struct Stats {
    video_frames: u64,
    audio_chunks: u64,
    audio_samples: u64,
    waits: u64,
    last_video_pts: f64,
    subtitle_frames: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("用法: myy-stream-probe <媒体文件> [分块字节数] [外挂字幕文件] [字体文件]");
    };
    let chunk_size = match args.next() {
        Some(text) => text.parse::<usize>().context("分块字节数无效")?.max(1),
        None => DEFAULT_CHUNK,
    };
    let subtitle_path = args.next().filter(|arg| arg != "-");
    let font_path = args.next();

    let data = fs::read(&path).with_context(|| format!("读取文件失败: {}", path))?;
    info!("🎬 探测 {} ({} 字节, 分块 {} 字节)", path, data.len(), chunk_size);

    let engine = FfmpegEngine::new().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    let config = SessionConfig {
        init_logger: false,
        ..SessionConfig::default()
    };
    let mut session = Session::new(engine, config)?;
    session.set_known_file_size(Some(data.len() as u64));

    let versions = session.versions();
    info!(
        "引擎版本: codec {:#x}, format {:#x}, util {:#x}; HEVC+AV1: {}",
        versions.codec,
        versions.format,
        versions.util,
        session.supports_hevc_av1()
    );

    let mut chunks = data.chunks(chunk_size);

    // 探测阶段：字节不足时继续追加
    loop {
        match session.open(None) {
            Ok(()) => break,
            Err(PlayerError::WouldBlock) => match chunks.next() {
                Some(chunk) => {
                    session.append(chunk)?;
                }
                None => {
                    session.set_eof();
                    session.open(None).context("打开容器失败")?;
                    break;
                }
            },
            Err(e) => return Err(e).context("打开容器失败"),
        }
    }

    info!("时长 {:.2} 秒, {} 个流", session.duration_seconds(), session.streams_count());
    for index in 0..session.streams_count() {
        if let Some(stream) = session.stream(index) {
            info!(
                "  #{} {} {} 语言 {:?} 标题 {:?}{}",
                stream.index,
                stream.kind.as_str(),
                stream.codec_name,
                stream.language,
                stream.title,
                if stream.is_default { " (默认)" } else { "" }
            );
        }
    }
    info!(
        "已选择: 视频 {:?}, 音频 {:?}; 字幕光栅化器: {}",
        session.selected_video_stream(),
        session.selected_audio_stream(),
        if session.has_cue_rasterizer() { "有" } else { "无" }
    );

    if let Some(font_path) = font_path {
        let data = fs::read(&font_path).with_context(|| format!("读取字体失败: {}", font_path))?;
        session.add_embedded_font(&font_path, &data)?;
    }
    if let Some(subtitle_path) = subtitle_path {
        load_subtitles(&mut session, &subtitle_path)?;
    } else if let Err(e) = session.select_subtitle_stream(StreamSelection::Auto) {
        warn!("内嵌字幕流无法打开: {}", e);
    }

    let mut stats = Stats::default();
    loop {
        match session.read_next_unit()? {
            Unit::VideoFrame => {
                stats.video_frames += 1;
                stats.last_video_pts = session.video_pts_seconds();
                if stats.video_frames == 1 {
                    let image = session.convert_to_rgba()?;
                    info!("首帧 RGBA {}x{}", image.width(), image.height());
                }
                // 有字幕时把字幕叠加到 RGBA 帧上
                if session.subtitles_enabled() && session.cue_count() > 0 {
                    session.convert_to_rgba()?;
                    if session.render_subtitles(stats.last_video_pts)? {
                        stats.subtitle_frames += 1;
                    }
                }
            }
            Unit::AudioChunk => {
                stats.audio_chunks += 1;
                if let Some(chunk) = session.audio_chunk() {
                    stats.audio_samples += chunk.sample_count() as u64;
                }
            }
            Unit::NoDataYet => {
                stats.waits += 1;
                match chunks.next() {
                    Some(chunk) => {
                        session.append(chunk)?;
                    }
                    None => session.set_eof(),
                }
            }
            Unit::EndOfStream => break,
        }
    }

    info!(
        "✅ 完成: 视频 {} 帧 (末帧 {:.3}s, 叠加字幕 {} 帧), 音频 {} 段 / {} 采样, 等待数据 {} 次, 缓冲 {} 字节",
        stats.video_frames,
        stats.last_video_pts,
        stats.subtitle_frames,
        stats.audio_chunks,
        stats.audio_samples,
        stats.waits,
        session.buffered_bytes()
    );

    session.close();
    Ok(())
}

fn load_subtitles(session: &mut Session<FfmpegEngine>, path: &str) -> Result<()> {
    let format = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(SubtitleFormat::from_extension);
    let Some(format) = format else {
        warn!("不支持的字幕扩展名: {}", path);
        return Ok(());
    };

    let text = fs::read_to_string(path).with_context(|| format!("读取字幕失败: {}", path))?;
    let count = session.import_cues(&text, format)?;
    info!("外挂字幕: {} 条, 首条 {:?}", count, session.first_cue_timing());
    Ok(())
}
