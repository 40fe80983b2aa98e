use crate::core::Rational;
use crate::engine::{CueBitmap, CueRasterizer, DecodedSubtitle, PacketInfo, SubtitleRect};
use crate::player::cue::{Cue, CueContent, CueTrack};
use image::{Rgba, RgbaImage};
use log::{debug, trace};

/// 字幕合成器
///
/// 维护字幕时间线，并把光栅化后的字幕位图混合到当前 RGBA 帧上。
/// 光栅化器由引擎提供或由宿主安装；未安装时渲染总是报告"无变化"。
pub struct SubtitleCompositor {
    track: CueTrack,
    rasterizer: Option<Box<dyn CueRasterizer>>,
    /// 已添加的字体，更换光栅化器时重新转交
    fonts: Vec<(String, Vec<u8>)>,
    fallback_ms: i64,
}

impl SubtitleCompositor {
    pub fn new(fallback_ms: i64) -> Self {
        Self {
            track: CueTrack::default(),
            rasterizer: None,
            fonts: Vec::new(),
            fallback_ms,
        }
    }

    pub fn set_rasterizer(&mut self, mut rasterizer: Box<dyn CueRasterizer>) {
        for (name, data) in &self.fonts {
            rasterizer.add_font(name, data);
        }
        self.rasterizer = Some(rasterizer);
    }

    pub fn has_rasterizer(&self) -> bool {
        self.rasterizer.is_some()
    }

    pub fn add_font(&mut self, name: &str, data: &[u8]) {
        if let Some(rasterizer) = self.rasterizer.as_mut() {
            rasterizer.add_font(name, data);
        }
        self.fonts.push((name.to_string(), data.to_vec()));
        debug!("添加字体: {} ({} 字节)", name, data.len());
    }

    /// 换成新字幕流的时间线
    pub fn rebuild(&mut self, header: Option<String>) {
        self.track = CueTrack::new(header);
    }

    /// 清空时间线，保留私有头
    pub fn reset(&mut self) {
        self.track.reset();
    }

    pub fn track(&self) -> &CueTrack {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut CueTrack {
        &mut self.track
    }

    /// 把解码后的字幕加入时间线，返回新增条数
    ///
    /// 开始时间取 pts，缺失时取 dts，都没有则丢弃；时长依次取解码器的显示结束时间、
    /// 数据包时长和兜底时长，保证字幕总是可见。
    pub fn ingest(&mut self, decoded: DecodedSubtitle, packet: &PacketInfo, time_base: Rational) -> usize {
        let Some(start) = packet.pts.or(packet.dts) else {
            debug!("字幕包没有时间戳，丢弃");
            return 0;
        };

        let start_seconds = time_base.seconds(Some(start));
        let mut duration_seconds = decoded.end_display_ms as f64 / 1000.0;
        if duration_seconds <= 0.0 && packet.duration > 0 {
            duration_seconds = time_base.seconds(Some(packet.duration));
        }
        if duration_seconds <= 0.0 {
            duration_seconds = self.fallback_ms as f64 / 1000.0;
        }

        let start_ms = (start_seconds * 1000.0).round() as i64;
        let duration_ms = (duration_seconds * 1000.0).round() as i64;

        let mut added = 0;
        for rect in decoded.rects {
            let content = match rect {
                SubtitleRect::Ass(event) => CueContent::Markup(event),
                SubtitleRect::Text(text) => CueContent::Plain(text),
            };
            trace!("字幕 [{} ms, +{} ms]: {:?}", start_ms, duration_ms, content);
            if self.track.push(Cue {
                start_ms,
                duration_ms,
                content,
            }) {
                added += 1;
            }
        }
        added
    }

    /// 把 `pts_seconds` 时刻的字幕混合到图像上，返回图像是否被修改
    pub fn render(&mut self, image: &mut RgbaImage, pts_seconds: f64) -> bool {
        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return false;
        };
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return false;
        }

        let time_ms = (pts_seconds * 1000.0) as i64;
        let bitmaps = rasterizer.render(&self.track, time_ms, width, height);
        if bitmaps.is_empty() {
            trace!(
                "{} ms 没有可见字幕 (共 {} 条, 首条 {:?})",
                time_ms,
                self.track.len(),
                self.track.first_timing()
            );
            return false;
        }

        for bitmap in &bitmaps {
            blend_bitmap(image, bitmap);
        }
        true
    }
}

/// 把单色覆盖率位图 "over" 混合到 RGBA 图像上
///
/// 逐像素 alpha = 覆盖率 × 不透明度 / 255；完全不透明直接覆盖，
/// 越界像素跳过。整数运算，结果 alpha 通道按源 alpha 255 混合。
pub fn blend_bitmap(image: &mut RgbaImage, bitmap: &CueBitmap) {
    let (dst_width, dst_height) = image.dimensions();
    let [r, g, b] = bitmap.color;
    let opacity = bitmap.opacity as u32;
    if opacity == 0 || bitmap.width == 0 || bitmap.height == 0 {
        return;
    }

    for y in 0..bitmap.height {
        let dst_y = bitmap.y as i64 + y as i64;
        if dst_y < 0 || dst_y >= dst_height as i64 {
            continue;
        }

        let row_start = y as usize * bitmap.stride;
        let Some(row) = bitmap
            .coverage
            .get(row_start..row_start + bitmap.width as usize)
        else {
            break;
        };

        for (x, &coverage) in row.iter().enumerate() {
            let dst_x = bitmap.x as i64 + x as i64;
            if dst_x < 0 || dst_x >= dst_width as i64 {
                continue;
            }

            let alpha = coverage as u32 * opacity / 255;
            if alpha == 0 {
                continue;
            }

            let pixel = image.get_pixel_mut(dst_x as u32, dst_y as u32);
            if alpha == 255 {
                *pixel = Rgba([r, g, b, 255]);
            } else {
                let inv = 255 - alpha;
                let over = |dst: u8, src: u8| ((dst as u32 * inv + src as u32 * alpha) / 255) as u8;
                let Rgba([pr, pg, pb, pa]) = *pixel;
                *pixel = Rgba([over(pr, r), over(pg, g), over(pb, b), over(pa, 255)]);
            }
        }
    }
}
