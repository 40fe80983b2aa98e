//! 字幕字形光栅化：把可见字幕排成 SVG 文本，用 usvg 转成路径、resvg 渲染，
//! 再取 alpha 通道作为覆盖率蒙版。
//!
//! 先画黑色描边，再画白色字形，两张位图依次混合。

use crate::engine::{CueBitmap, CueRasterizer};
use crate::player::cue::CueTrack;
use log::{debug, info, warn};
use resvg::tiny_skia;
use usvg::{fontdb, TreeParsing, TreeTextToPath};

const FILL_COLOR: [u8; 3] = [255, 255, 255];
const OUTLINE_COLOR: [u8; 3] = [0, 0, 0];

/// 字号相对画面高度的比例
const FONT_SCALE: f32 = 0.06;
const MIN_FONT_SIZE: f32 = 12.0;
const LINE_SPACING: f32 = 1.25;
/// 底边距相对画面高度的比例
const BOTTOM_MARGIN: f32 = 0.05;

/// 上一次渲染的输入和结果；同一画面尺寸下文字不变时直接复用
struct RenderCache {
    lines: Vec<String>,
    size: (u32, u32),
    bitmaps: Vec<CueBitmap>,
}

/// 基于 resvg 的字幕光栅化器
///
/// 宿主添加的字体优先，系统字体（如已加载）作为后备。
pub struct SvgCueRasterizer {
    fonts: fontdb::Database,
    families: Vec<String>,
    cache: Option<RenderCache>,
}

impl Default for SvgCueRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgCueRasterizer {
    /// 不含任何字体；添加字体前不会画出任何东西
    pub fn new() -> Self {
        Self {
            fonts: fontdb::Database::new(),
            families: Vec::new(),
            cache: None,
        }
    }

    /// 加载系统字体作为后备
    pub fn with_system_fonts() -> Self {
        let mut rasterizer = Self::new();
        rasterizer.fonts.load_system_fonts();
        info!("字幕光栅化器: 已加载 {} 个系统字体", rasterizer.fonts.len());
        rasterizer
    }

    pub fn face_count(&self) -> usize {
        self.fonts.len()
    }

    /// 宿主添加的字体族名，按添加顺序
    pub fn families(&self) -> &[String] {
        &self.families
    }

    fn render_pass(&self, lines: &[String], width: u32, height: u32, pass: Pass) -> Option<CueBitmap> {
        let document = build_document(lines, width, height, &self.families, pass);

        let mut tree = match usvg::Tree::from_str(&document, &usvg::Options::default()) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("字幕 SVG 解析失败: {}", e);
                return None;
            }
        };
        tree.convert_text(&self.fonts);

        let mut pixmap = tiny_skia::Pixmap::new(width, height)?;
        pixmap.fill(tiny_skia::Color::TRANSPARENT);
        let rtree = resvg::Tree::from_usvg(&tree);
        rtree.render(tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        let alpha: Vec<u8> = pixmap.pixels().iter().map(|p| p.alpha()).collect();
        coverage_bitmap(&alpha, width, height, pass.color())
    }
}

impl CueRasterizer for SvgCueRasterizer {
    fn add_font(&mut self, name: &str, data: &[u8]) {
        let before = self.fonts.len();
        self.fonts.load_font_data(data.to_vec());
        if self.fonts.len() == before {
            warn!("字体 {} 无法解析，已忽略", name);
            return;
        }

        for face in self.fonts.faces() {
            if let Some((family, _)) = face.families.first() {
                if !self.families.contains(family) {
                    debug!("字体 {} 提供字体族 {}", name, family);
                    self.families.push(family.clone());
                }
            }
        }
        self.cache = None;
    }

    fn render(&mut self, track: &CueTrack, time_ms: i64, width: u32, height: u32) -> Vec<CueBitmap> {
        let lines = visible_lines(track, time_ms);
        if lines.is_empty() || self.fonts.len() == 0 {
            return Vec::new();
        }

        if let Some(cache) = &self.cache {
            if cache.lines == lines && cache.size == (width, height) {
                return cache.bitmaps.clone();
            }
        }

        let bitmaps: Vec<CueBitmap> = [Pass::Outline, Pass::Fill]
            .into_iter()
            .filter_map(|pass| self.render_pass(&lines, width, height, pass))
            .collect();
        self.cache = Some(RenderCache {
            lines,
            size: (width, height),
            bitmaps: bitmaps.clone(),
        });
        bitmaps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Outline,
    Fill,
}

impl Pass {
    fn color(self) -> [u8; 3] {
        match self {
            Pass::Outline => OUTLINE_COLOR,
            Pass::Fill => FILL_COLOR,
        }
    }

    fn paint(self, font_size: f32) -> String {
        match self {
            Pass::Outline => format!(
                r#"fill="black" stroke="black" stroke-width="{:.1}" stroke-linejoin="round""#,
                (font_size / 8.0).max(1.0)
            ),
            Pass::Fill => r#"fill="white""#.to_string(),
        }
    }
}

/// 某时刻所有可见字幕的文本行，按到达顺序从上到下
fn visible_lines(track: &CueTrack, time_ms: i64) -> Vec<String> {
    track
        .active_at(time_ms)
        .flat_map(|cue| {
            cue.content
                .display_text()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn font_size_for(height: u32) -> f32 {
    (height as f32 * FONT_SCALE).max(MIN_FONT_SIZE)
}

/// 底部居中排版：最后一行贴近底边距，前面的行依次向上
fn build_document(lines: &[String], width: u32, height: u32, families: &[String], pass: Pass) -> String {
    let font_size = font_size_for(height);
    let line_height = font_size * LINE_SPACING;
    let last_baseline = height as f32 * (1.0 - BOTTOM_MARGIN) - font_size * 0.25;

    let mut family_list: Vec<String> = families
        .iter()
        .map(|family| format!("'{}'", escape_xml(family)))
        .collect();
    family_list.push("sans-serif".to_string());

    let mut document = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text font-family="{families}" font-size="{size:.1}" text-anchor="middle" {paint}>"#,
        w = width,
        h = height,
        families = family_list.join(", "),
        size = font_size,
        paint = pass.paint(font_size),
    );
    let count = lines.len();
    for (i, line) in lines.iter().enumerate() {
        let baseline = last_baseline - (count - 1 - i) as f32 * line_height;
        document.push_str(&format!(
            r#"<tspan x="{:.1}" y="{:.1}">{}</tspan>"#,
            width as f32 / 2.0,
            baseline,
            escape_xml(line)
        ));
    }
    document.push_str("</text></svg>");
    document
}

/// 把整幅 alpha 图裁剪到非零区域，生成覆盖率位图
fn coverage_bitmap(alpha: &[u8], width: u32, height: u32, color: [u8; 3]) -> Option<CueBitmap> {
    let width = width as usize;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
    for (y, row) in alpha.chunks_exact(width).take(height as usize).enumerate() {
        for (x, &a) in row.iter().enumerate() {
            if a > 0 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }
    if min_x == usize::MAX {
        return None;
    }

    let crop_width = max_x - min_x + 1;
    let crop_height = max_y - min_y + 1;
    let mut coverage = Vec::with_capacity(crop_width * crop_height);
    for y in min_y..=max_y {
        let start = y * width + min_x;
        coverage.extend_from_slice(&alpha[start..start + crop_width]);
    }

    Some(CueBitmap {
        x: min_x as i32,
        y: min_y as i32,
        width: crop_width as u32,
        height: crop_height as u32,
        stride: crop_width,
        coverage,
        color,
        opacity: 255,
    })
}
