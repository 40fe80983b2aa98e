use crate::core::{PlayerError, ReadCompaction, Result, SessionConfig};
use log::{debug, trace};
use std::io::SeekFrom;

/// 首次扩容的最小容量
const MIN_CAPACITY: usize = 1024;

/// 单次读取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 读到 n 个字节
    Read(usize),
    /// 暂时没有数据，生产者尚未声明结束
    WouldBlock,
    /// 生产者已声明结束且数据已读完
    EndOfStream,
}

/// 流式字节缓冲
///
/// 在逐步到达的数据上模拟一个可 Seek 的文件：
/// - `data[start..start + size]` 是有效区，对应绝对位置 `offset..offset + size`
/// - `read_pos` 之前的字节已被解码引擎消费，但可能仍保留用于回看
/// - `start` 之前的字节在逻辑上已经丢弃
///
/// 不变量：`read_pos <= size <= capacity`，压缩只会让 `offset` 增大。
#[derive(Debug)]
pub struct StreamBuffer {
    /// 整块分配，`data.len()` 即容量
    data: Vec<u8>,
    start: usize,
    size: usize,
    read_pos: usize,
    offset: u64,
    limit: usize,
    keep_all: bool,
    eof: bool,
    total_size: Option<u64>,
    keep_backlog: usize,
    read_compaction: ReadCompaction,
}

impl StreamBuffer {
    /// 创建缓冲
    ///
    /// 初始 `keep_all = true`：格式探测可能回读早期字节，打开成功前禁止淘汰。
    pub fn new(initial_capacity: usize, config: &SessionConfig) -> Result<Self> {
        let mut data = Vec::new();
        if initial_capacity > 0 {
            data.try_reserve_exact(initial_capacity)
                .map_err(|_| PlayerError::OutOfMemory {
                    requested: initial_capacity,
                })?;
            data.resize(initial_capacity, 0);
        }

        Ok(Self {
            data,
            start: 0,
            size: 0,
            read_pos: 0,
            offset: 0,
            limit: config.buffer_limit,
            keep_all: true,
            eof: false,
            total_size: None,
            keep_backlog: config.keep_backlog,
            read_compaction: config.read_compaction,
        })
    }

    /// 追加字节，返回接受的字节数（总是全部接受，或者分配失败）
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }

        self.ensure_capacity(bytes.len())?;

        let end = self.start + self.size;
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        self.enforce_limit();
        Ok(bytes.len())
    }

    /// 保证有效区之后还能容纳 `additional` 字节
    fn ensure_capacity(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .start
            .checked_add(self.size)
            .and_then(|n| n.checked_add(additional))
            .ok_or(PlayerError::OutOfMemory {
                requested: usize::MAX,
            })?;
        if needed <= self.capacity() {
            return Ok(());
        }

        // 前部有空闲，先把有效区搬到开头
        if self.start > 0 {
            if self.size > 0 {
                self.data
                    .copy_within(self.start..self.start + self.size, 0);
            }
            self.start = 0;
        }

        let needed = self.size + additional;
        if needed <= self.capacity() {
            return Ok(());
        }

        let mut new_capacity = self.capacity().max(MIN_CAPACITY);
        while new_capacity < needed {
            match new_capacity.checked_mul(2) {
                Some(doubled) => new_capacity = doubled,
                None => {
                    new_capacity = needed;
                    break;
                }
            }
        }

        let extra = new_capacity - self.data.len();
        self.data
            .try_reserve_exact(extra)
            .map_err(|_| PlayerError::OutOfMemory {
                requested: new_capacity,
            })?;
        self.data.resize(new_capacity, 0);
        trace!("缓冲扩容: {} 字节", new_capacity);
        Ok(())
    }

    /// 读取最多 `out.len()` 个字节
    pub fn read(&mut self, out: &mut [u8]) -> ReadOutcome {
        if out.is_empty() {
            return ReadOutcome::Read(0);
        }

        let available = self.size - self.read_pos;
        if available == 0 {
            return if self.eof {
                ReadOutcome::EndOfStream
            } else {
                ReadOutcome::WouldBlock
            };
        }

        let n = available.min(out.len());
        let from = self.start + self.read_pos;
        out[..n].copy_from_slice(&self.data[from..from + n]);
        self.read_pos += n;

        match self.read_compaction {
            ReadCompaction::Threshold(threshold) => {
                if self.size > threshold {
                    self.compact();
                }
            }
            ReadCompaction::Always => self.compact(),
        }

        ReadOutcome::Read(n)
    }

    /// 定位到绝对位置
    ///
    /// 目标必须落在 `[offset, offset + size]` 之内，否则失败且不修改状态；
    /// 调用方需要在失败后从正确的绝对位置重新追加数据。
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let base = self.offset as i128;
        let end = base + self.size as i128;

        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(delta) => self.position() as i128 + delta as i128,
            SeekFrom::End(delta) => {
                if !self.eof {
                    return Err(PlayerError::Seek(
                        "流尚未结束，无法相对末尾定位".to_string(),
                    ));
                }
                end + delta as i128
            }
        };

        if target < base || target > end {
            return Err(PlayerError::Seek(format!(
                "目标位置 {} 不在缓冲区间 [{}, {}]",
                target, base, end
            )));
        }

        self.read_pos = (target - base) as usize;
        Ok(target as u64)
    }

    /// 流总长度查询
    ///
    /// 已知文件大小时直接返回；否则只有到达 EOF 后才能确定。
    pub fn stream_size(&self) -> Option<u64> {
        match self.total_size {
            Some(total) if total > 0 => Some(total),
            _ if self.eof => Some(self.offset + self.size as u64),
            _ => None,
        }
    }

    /// 淘汰已消费的前缀，保留 `keep_backlog` 字节回看
    pub fn compact(&mut self) {
        if self.read_pos == 0 || self.keep_all || self.read_pos <= self.keep_backlog {
            return;
        }
        let drop = self.read_pos - self.keep_backlog;
        self.drop_prefix(drop);
    }

    /// 超过软上限时淘汰可安全丢弃的前缀
    ///
    /// 未消费的字节永远不会被丢弃，必要时允许暂时超过上限。
    pub fn enforce_limit(&mut self) {
        if self.limit == 0 || self.keep_all || self.size <= self.limit {
            return;
        }

        let safe_drop = self.read_pos.saturating_sub(self.keep_backlog);
        if safe_drop == 0 {
            trace!(
                "缓冲超限 ({} > {})，但没有可安全丢弃的数据",
                self.size,
                self.limit
            );
            return;
        }

        let drop = (self.size - self.limit).min(safe_drop);
        self.drop_prefix(drop);
    }

    fn drop_prefix(&mut self, drop: usize) {
        if drop >= self.size {
            self.size = 0;
            self.read_pos = 0;
            self.start = 0;
        } else {
            self.start += drop;
            self.size -= drop;
            self.read_pos -= drop;
        }
        self.offset += drop as u64;
    }

    /// 读取游标回到有效区开头（格式探测前使用）
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// 清空为新的起点，保留已分配内存
    ///
    /// 调用方必须紧接着追加从 `offset` 开始的字节。
    pub fn restart_at(&mut self, offset: u64) {
        debug!("缓冲重置到绝对位置 {}", offset);
        self.start = 0;
        self.size = 0;
        self.read_pos = 0;
        self.eof = false;
        self.offset = offset;
    }

    pub fn set_eof(&mut self) {
        self.eof = true;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn set_keep_all(&mut self, enabled: bool) {
        self.keep_all = enabled;
    }

    pub fn keep_all(&self) -> bool {
        self.keep_all
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.enforce_limit();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_total_size(&mut self, total: Option<u64>) {
        self.total_size = total;
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 当前读取位置（绝对）
    pub fn position(&self) -> u64 {
        self.offset + self.read_pos as u64
    }

    /// 已缓冲但尚未消费的字节数
    pub fn buffered_bytes(&self) -> usize {
        self.size - self.read_pos
    }
}
