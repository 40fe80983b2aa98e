use crate::core::{PlayerError, Result};
use crate::stream::buffer::{ReadOutcome, StreamBuffer};
use log::trace;
use parking_lot::Mutex;
use std::io::{self, SeekFrom};
use std::sync::Arc;

/// 会话（生产者）与解码引擎（消费者）共享的缓冲
pub type SharedBuffer = Arc<Mutex<StreamBuffer>>;

/// 解码引擎的读取 / 定位适配器
///
/// 没有新数据但生产者尚未结束时返回 `WouldBlock` 而不是 EOF，
/// 让引擎稍后重试而不是把流当作已关闭。
/// 容器打开前禁止定位：格式探测只能顺序向前读。
#[derive(Debug, Clone)]
pub struct ByteSource {
    buffer: SharedBuffer,
    seekable: bool,
}

impl ByteSource {
    pub fn new(buffer: SharedBuffer) -> Self {
        Self {
            buffer,
            seekable: false,
        }
    }

    pub fn read_into(&mut self, out: &mut [u8]) -> ReadOutcome {
        let outcome = self.buffer.lock().read(out);
        trace!("ByteSource 读取 {} 字节 -> {:?}", out.len(), outcome);
        outcome
    }

    /// 定位；目标不在缓冲中时失败，调用方应改为重新推流
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.seekable {
            return Err(PlayerError::Seek("容器打开前不允许定位".to_string()));
        }
        self.buffer.lock().seek(pos)
    }

    /// 流总长度，未知时为 `None`
    pub fn size(&self) -> Option<u64> {
        self.buffer.lock().stream_size()
    }

    /// 当前绝对读取位置
    pub fn position(&self) -> u64 {
        self.buffer.lock().position()
    }

    pub fn set_seekable(&mut self, seekable: bool) {
        self.seekable = seekable;
    }
}

impl io::Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_into(buf) {
            ReadOutcome::Read(n) => Ok(n),
            ReadOutcome::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
            ReadOutcome::EndOfStream => Ok(0),
        }
    }
}

impl io::Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        ByteSource::seek(self, pos).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}
