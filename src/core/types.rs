use serde::{Deserialize, Serialize};

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Data => "data",
            MediaKind::Attachment => "attachment",
            MediaKind::Unknown => "unknown",
        }
    }
}

/// 流选择方式
///
/// 替代 `-1`（自动）/ `-2`（禁用）这类魔数约定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelection {
    /// 由引擎挑选最佳流
    Auto,
    /// 禁用该类型
    Disabled,
    /// 指定流索引
    Index(usize),
}

/// 有理数时间基
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.den != 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// 时间戳换算为秒，时间戳未知或时间基无效时返回 0.0
    pub fn seconds(&self, timestamp: Option<i64>) -> f64 {
        match timestamp {
            Some(ts) if self.is_valid() => ts as f64 * self.as_f64(),
            _ => 0.0,
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self { num: 0, den: 1 }
    }
}

/// 引擎内部的格式编号（像素格式或采样格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatId(pub i32);

impl FormatId {
    pub const NONE: FormatId = FormatId(-1);
}

/// 基本流描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub codec_id: u32,
    pub codec_name: String,
    pub language: Option<String>,
    pub title: Option<String>,
    pub is_default: bool,
    pub time_base: Rational,
}

/// 音频参数（重采样器缓存键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSpec {
    pub format: FormatId,
    pub channels: u16,
    pub channel_mask: u64,
    pub sample_rate: u32,
}

/// 调度器单次调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// 解码出一帧视频
    VideoFrame,
    /// 解码并重采样出一段音频
    AudioChunk,
    /// 暂无数据，需要追加字节后重试
    NoDataYet,
    /// 所有启用的流都已排空
    EndOfStream,
}

impl Unit {
    /// 边界层状态码：视频 1、音频 2、无数据 0、结束 -1
    pub fn code(&self) -> i32 {
        match self {
            Unit::VideoFrame => 1,
            Unit::AudioChunk => 2,
            Unit::NoDataYet => 0,
            Unit::EndOfStream => -1,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Closed,
    Opening,
    Open,
}

/// 引擎库版本号
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersions {
    pub codec: u32,
    pub format: u32,
    pub util: u32,
}

/// 输出目标：立体声
pub const OUTPUT_CHANNELS: u16 = 2;
/// 输出目标：48 kHz
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// 引擎内部时间单位（微秒）
pub const TIME_BASE_US: i64 = 1_000_000;
