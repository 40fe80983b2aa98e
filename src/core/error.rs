use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    #[error("状态错误: {0}")]
    InvalidState(String),

    #[error("内存分配失败: 需要 {requested} 字节")]
    OutOfMemory { requested: usize },

    /// 暂无数据，调用方需在追加更多字节后重试（不是真正的错误）
    #[error("暂无数据，请追加数据后重试")]
    WouldBlock,

    #[error("数据流已结束")]
    EndOfStream,

    /// 解码引擎内部错误，`code` 为引擎原始错误码
    #[error("解码错误 (code {code}): {message}")]
    Decode { code: i32, message: String },

    #[error("Seek 失败: {0}")]
    Seek(String),

    #[error("不支持的流: {0}")]
    UnsupportedStream(String),

    #[error("配置错误: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;

impl PlayerError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        PlayerError::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        PlayerError::InvalidState(msg.into())
    }

    pub fn decode(code: i32, msg: impl Into<String>) -> Self {
        PlayerError::Decode {
            code,
            message: msg.into(),
        }
    }

    /// 边界层使用的整数状态码
    ///
    /// `0` 与 `-1` 分别保留给 `NoDataYet` 和 `EndOfStream` 结果，
    /// 其余错误一律为小于 `-1` 的值。
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::WouldBlock => 0,
            PlayerError::EndOfStream => -1,
            PlayerError::InvalidArgument(_) => -2,
            PlayerError::InvalidState(_) => -3,
            PlayerError::OutOfMemory { .. } => -4,
            PlayerError::Decode { .. } => -5,
            PlayerError::Seek(_) => -6,
            PlayerError::UnsupportedStream(_) => -7,
            PlayerError::Config(_) => -8,
        }
    }

    /// 瞬时状态：调用方稍后重试即可
    pub fn is_transient(&self) -> bool {
        matches!(self, PlayerError::WouldBlock)
    }

    /// 引擎原始错误码（仅解码错误携带）
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            PlayerError::Decode { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        use ffmpeg_next::util::error::{EAGAIN, ENOMEM};
        use ffmpeg_next::Error as FfError;

        match err {
            FfError::Other { errno } if errno == EAGAIN => PlayerError::WouldBlock,
            FfError::Other { errno } if errno == ENOMEM => PlayerError::OutOfMemory { requested: 0 },
            FfError::Eof => PlayerError::EndOfStream,
            FfError::DecoderNotFound | FfError::StreamNotFound => {
                PlayerError::UnsupportedStream(err.to_string())
            }
            other => {
                let message = other.to_string();
                PlayerError::Decode {
                    code: i32::from(other),
                    message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_below_sentinels() {
        let errors = [
            PlayerError::invalid_argument("x"),
            PlayerError::invalid_state("x"),
            PlayerError::OutOfMemory { requested: 1 },
            PlayerError::decode(-22, "x"),
            PlayerError::Seek("x".into()),
            PlayerError::UnsupportedStream("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|c| *c < -1));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_engine_code_payload() {
        let err = PlayerError::decode(-1094995529, "Invalid data found");
        assert_eq!(err.engine_code(), Some(-1094995529));
        assert_eq!(err.code(), -5);
        assert!(PlayerError::WouldBlock.is_transient());
        assert!(!PlayerError::EndOfStream.is_transient());
    }
}
