use crate::core::{PlayerError, Result};
use log::{debug, info, warn};

/// 字幕内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CueContent {
    /// ASS 事件（`Dialogue:` 行或解码器输出的 `ReadOrder,Layer,Style,...` 格式）
    Markup(String),
    /// 纯文本
    Plain(String),
}

impl CueContent {
    /// 去掉 ASS 字段和覆盖标签后的可显示文本
    pub fn display_text(&self) -> String {
        match self {
            CueContent::Markup(event) => clean_subtitle_text(ass_event_text(event)),
            CueContent::Plain(text) => clean_subtitle_text(text),
        }
    }
}

/// 一条定时字幕
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start_ms: i64,
    pub duration_ms: i64,
    pub content: CueContent,
}

impl Cue {
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.duration_ms
    }

    pub fn is_active(&self, time_ms: i64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms()
    }
}

/// 外部字幕文本格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Ass,
    Vtt,
}

impl SubtitleFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "srt" => Some(SubtitleFormat::Srt),
            "ass" | "ssa" => Some(SubtitleFormat::Ass),
            "vtt" => Some(SubtitleFormat::Vtt),
            _ => None,
        }
    }
}

/// 字幕时间线
///
/// 按到达顺序保存字幕；重置时保留编解码器私有头。
#[derive(Debug, Clone, Default)]
pub struct CueTrack {
    header: Option<String>,
    cues: Vec<Cue>,
}

impl CueTrack {
    pub fn new(header: Option<String>) -> Self {
        Self {
            header,
            cues: Vec::new(),
        }
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// 加入一条字幕；完全相同的字幕（Seek 后重复解码）会被忽略
    pub fn push(&mut self, cue: Cue) -> bool {
        if self.cues.contains(&cue) {
            return false;
        }
        self.cues.push(cue);
        true
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn active_at(&self, time_ms: i64) -> impl Iterator<Item = &Cue> {
        self.cues.iter().filter(move |cue| cue.is_active(time_ms))
    }

    /// 第一条字幕的 (开始, 结束) 毫秒
    pub fn first_timing(&self) -> Option<(i64, i64)> {
        self.cues.first().map(|cue| (cue.start_ms, cue.end_ms()))
    }

    /// 清空字幕，保留私有头
    pub fn reset(&mut self) {
        self.cues.clear();
    }

    /// 导入外部字幕文本，返回新增条数
    pub fn import(&mut self, text: &str, format: SubtitleFormat) -> Result<usize> {
        let cues = match format {
            SubtitleFormat::Srt => parse_srt(text),
            SubtitleFormat::Vtt => parse_vtt(text)?,
            SubtitleFormat::Ass => {
                let (header, cues) = parse_ass(text)?;
                if self.header.is_none() && !header.is_empty() {
                    self.header = Some(header);
                }
                cues
            }
        };

        let added = cues.into_iter().filter(|cue| self.push(cue.clone())).count();
        info!("导入 {:?} 字幕完成，新增 {} 条", format, added);
        Ok(added)
    }
}

/// 取出 ASS 事件的 Text 字段
fn ass_event_text(event: &str) -> &str {
    // Dialogue: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
    // 解码器输出: ReadOrder,Layer,Style,Name,MarginL,MarginR,MarginV,Effect,Text
    let (body, fields) = match event.strip_prefix("Dialogue:") {
        Some(rest) => (rest, 10),
        None => (event, 9),
    };
    body.splitn(fields, ',').nth(fields - 1).unwrap_or(body)
}

/// 清理字幕文本：移除 ASS 覆盖标签和 HTML 风格标签，处理 `\N` 换行
pub fn clean_subtitle_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_ass_tag = false;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => in_ass_tag = true,
            '}' => in_ass_tag = false,
            _ if in_ass_tag => {}
            '<' => {
                // <i>, </b>, <font color=..> 之类
                let mut lookahead = chars.clone();
                let mut closed = false;
                for next in lookahead.by_ref() {
                    if next == '>' {
                        closed = true;
                        break;
                    }
                    if next == '<' || next == '\n' {
                        break;
                    }
                }
                if closed {
                    chars = lookahead;
                } else {
                    result.push(ch);
                }
            }
            '\\' => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    result.push('\n');
                }
                Some('h') => {
                    chars.next();
                    result.push(' ');
                }
                _ => result.push(ch),
            },
            '\r' => {}
            _ => result.push(ch),
        }
    }

    result
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 解析 `[HH:]MM:SS<sep>fff` 时间戳为毫秒；小数部分按位数换算（ASS 为百分秒）
fn parse_clock(timestamp: &str, fraction_sep: char) -> Option<i64> {
    let (clock, fraction) = timestamp.trim().split_once(fraction_sep)?;

    let digits = fraction.len().min(3);
    let mut millis: i64 = fraction.get(..digits)?.parse().ok()?;
    for _ in digits..3 {
        millis *= 10;
    }

    let components: Vec<i64> = clock
        .split(':')
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<_>>>()?;

    let (hours, minutes, seconds) = match components.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

fn parse_time_line(line: &str, fraction_sep: char) -> Option<(i64, i64)> {
    let (start, rest) = line.split_once("-->")?;
    // VTT 时间行后面可能跟排版设置
    let end = rest.split_whitespace().next()?;
    Some((parse_clock(start, fraction_sep)?, parse_clock(end, fraction_sep)?))
}

/// SRT / VTT 共用的块解析
fn parse_blocks(content: &str, fraction_sep: char) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut current: Option<(i64, i64, String)> = None;

    fn finish(current: &mut Option<(i64, i64, String)>, cues: &mut Vec<Cue>) {
        if let Some((start, end, text)) = current.take() {
            if !text.trim().is_empty() && end > start {
                cues.push(Cue {
                    start_ms: start,
                    duration_ms: end - start,
                    content: CueContent::Plain(text),
                });
            }
        }
    }

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() {
            finish(&mut current, &mut cues);
            continue;
        }

        if line.contains("-->") {
            finish(&mut current, &mut cues);
            match parse_time_line(line, fraction_sep) {
                Some((start, end)) => current = Some((start, end, String::new())),
                None => warn!("无法解析时间行 (第{}行): {}", line_num + 1, line),
            }
            continue;
        }

        if let Some((_, _, text)) = current.as_mut() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line);
        }
    }
    finish(&mut current, &mut cues);

    cues
}

fn parse_srt(content: &str) -> Vec<Cue> {
    parse_blocks(content, ',')
}

fn parse_vtt(content: &str) -> Result<Vec<Cue>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.trim_start().starts_with("WEBVTT") {
        return Err(PlayerError::invalid_argument("VTT 文本缺少 WEBVTT 头部"));
    }

    // NOTE / STYLE 块没有时间行，块解析时自然被跳过
    Ok(parse_blocks(content, '.'))
}

/// 返回 (脚本头, 字幕)
fn parse_ass(content: &str) -> Result<(String, Vec<Cue>)> {
    let mut header = String::new();
    let mut cues = Vec::new();
    let mut in_events = false;
    let mut seen_events = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_events = trimmed.eq_ignore_ascii_case("[Events]");
            seen_events |= in_events;
        }

        if !seen_events {
            header.push_str(line);
            header.push('\n');
            continue;
        }

        if !in_events {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("Dialogue:") {
            // Layer,Start,End,...
            let fields: Vec<&str> = rest.splitn(4, ',').collect();
            if fields.len() < 4 {
                debug!("跳过格式错误的 Dialogue 行: {}", trimmed);
                continue;
            }
            let (Some(start), Some(end)) = (parse_clock(fields[1], '.'), parse_clock(fields[2], '.'))
            else {
                debug!("跳过时间戳无效的 Dialogue 行: {}", trimmed);
                continue;
            };
            if end <= start {
                continue;
            }
            cues.push(Cue {
                start_ms: start,
                duration_ms: end - start,
                content: CueContent::Markup(trimmed.to_string()),
            });
        }
    }

    if !seen_events {
        return Err(PlayerError::invalid_argument("ASS 文本缺少 [Events] 段"));
    }

    Ok((header, cues))
}
