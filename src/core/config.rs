use crate::core::Result;
use serde::{Deserialize, Serialize};

/// 读取后压缩策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadCompaction {
    /// 仅当缓冲总量超过阈值时压缩。
    /// 容器解析器（例如 EBML）依赖稳定的回看窗口，频繁压缩会破坏解析。
    Threshold(usize),
    /// 每次读取后都压缩（普通预算的缓冲）
    Always,
}

impl Default for ReadCompaction {
    fn default() -> Self {
        ReadCompaction::Threshold(256 * 1024 * 1024)
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 初始缓冲容量（字节）
    pub initial_capacity: usize,
    /// 软内存上限（字节），0 表示不限
    pub buffer_limit: usize,
    /// 已消费数据中保留的回看量（字节）
    pub keep_backlog: usize,
    /// 读取后的压缩策略
    pub read_compaction: ReadCompaction,
    /// 无法推导字幕时长时的兜底时长（毫秒）
    pub subtitle_fallback_ms: i64,
    /// Seek / 重新推流后是否清空字幕时间线
    pub reset_cues_on_seek: bool,
    /// 引擎 IO 缓冲大小（字节）
    pub io_buffer_size: usize,
    /// 默认日志过滤级别
    pub log_level: String,
    /// 首次创建会话时是否安装 env_logger
    pub init_logger: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            buffer_limit: 0,
            keep_backlog: 4 * 1024 * 1024,
            read_compaction: ReadCompaction::default(),
            subtitle_fallback_ms: 4000,
            reset_cues_on_seek: true,
            io_buffer_size: 32 * 1024,
            log_level: "warn".to_string(),
            init_logger: true,
        }
    }
}

impl SessionConfig {
    /// 从 JSON 文本加载，缺省字段使用默认值
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_initial_capacity(mut self, bytes: usize) -> Self {
        self.initial_capacity = bytes;
        self
    }

    pub fn with_buffer_limit(mut self, bytes: usize) -> Self {
        self.buffer_limit = bytes;
        self
    }

    pub fn with_keep_backlog(mut self, bytes: usize) -> Self {
        self.keep_backlog = bytes;
        self
    }

    pub fn with_read_compaction(mut self, policy: ReadCompaction) -> Self {
        self.read_compaction = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PlayerError;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.keep_backlog, 4 * 1024 * 1024);
        assert_eq!(config.read_compaction, ReadCompaction::Threshold(256 * 1024 * 1024));
        assert_eq!(config.subtitle_fallback_ms, 4000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = SessionConfig::from_json(
            r#"{ "buffer_limit": 1000, "read_compaction": "always", "subtitle_fallback_ms": 2500 }"#,
        )
        .unwrap();
        assert_eq!(config.buffer_limit, 1000);
        assert_eq!(config.read_compaction, ReadCompaction::Always);
        assert_eq!(config.subtitle_fallback_ms, 2500);
        assert_eq!(config.io_buffer_size, 32 * 1024);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = SessionConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }
}
