use crate::core::{PlayerError, Result};
use crate::stream::{ByteSource, ReadOutcome};
use ffmpeg_next::ffi;
use ffmpeg_next::util::error::EAGAIN;
use log::trace;
use std::ffi::{c_int, c_void};
use std::io::SeekFrom;
use std::slice;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;

/// 自定义 AVIO：引擎通过回调从 `ByteSource` 读取
///
/// 持有 AVIOContext（连同其内部缓冲）和回调的 opaque 指针。
/// 必须在使用它的 AVFormatContext 关闭之后释放。
pub(super) struct AvioHandle {
    ctx: *mut ffi::AVIOContext,
    source: *mut ByteSource,
}

impl AvioHandle {
    pub fn new(source: ByteSource, buffer_size: usize) -> Result<Self> {
        let source = Box::into_raw(Box::new(source));

        unsafe {
            let buffer = ffi::av_malloc(buffer_size) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(source));
                return Err(PlayerError::OutOfMemory {
                    requested: buffer_size,
                });
            }

            let ctx = ffi::avio_alloc_context(
                buffer,
                buffer_size as c_int,
                0,
                source as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_stream),
            );
            if ctx.is_null() {
                ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(source));
                return Err(PlayerError::OutOfMemory {
                    requested: buffer_size,
                });
            }

            // 格式探测期间禁止定位
            (*ctx).seekable = 0;
            Ok(Self { ctx, source })
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.ctx
    }

    pub fn set_seekable(&mut self, seekable: bool) {
        unsafe {
            (*self.ctx).seekable = if seekable {
                ffi::AVIO_SEEKABLE_NORMAL as c_int
            } else {
                0
            };
            (*self.source).set_seekable(seekable);
        }
    }

    /// 清除读取层残留的 EOF / 错误标志
    pub fn clear_eof(&mut self) {
        unsafe {
            (*self.ctx).eof_reached = 0;
            (*self.ctx).error = 0;
        }
    }

    /// 丢弃 AVIO 内部缓冲，从新的绝对位置继续
    pub fn restart_at(&mut self, position: u64) {
        unsafe {
            let ctx = self.ctx;
            (*ctx).pos = position as i64;
            (*ctx).buf_ptr = (*ctx).buffer;
            (*ctx).buf_end = (*ctx).buffer;
        }
        self.clear_eof();
    }
}

impl Drop for AvioHandle {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                ffi::av_freep(&mut (*self.ctx).buffer as *mut *mut u8 as *mut c_void);
                ffi::avio_context_free(&mut self.ctx);
            }
            drop(Box::from_raw(self.source));
        }
    }
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size <= 0 {
        return 0;
    }
    let source = &mut *(opaque as *mut ByteSource);
    let out = slice::from_raw_parts_mut(buf, buf_size as usize);

    match source.read_into(out) {
        ReadOutcome::Read(n) => n as c_int,
        ReadOutcome::WouldBlock => ffi::AVERROR(EAGAIN),
        ReadOutcome::EndOfStream => ffi::AVERROR_EOF,
    }
}

unsafe extern "C" fn seek_stream(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    if opaque.is_null() {
        return -1;
    }
    let source = &mut *(opaque as *mut ByteSource);

    if whence & ffi::AVSEEK_SIZE as c_int != 0 {
        return source.size().map_or(-1, |size| size as i64);
    }

    let target = match whence & !(ffi::AVSEEK_FORCE as c_int) {
        SEEK_SET if offset >= 0 => SeekFrom::Start(offset as u64),
        SEEK_CUR => SeekFrom::Current(offset),
        SEEK_END => SeekFrom::End(offset),
        _ => return -1,
    };

    match source.seek(target) {
        Ok(position) => position as i64,
        Err(e) => {
            trace!("AVIO 定位失败 ({:?}): {}", target, e);
            -1
        }
    }
}
