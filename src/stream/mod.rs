// 流式字节缓冲与引擎读取适配

pub mod buffer;
pub mod source;

pub use buffer::{ReadOutcome, StreamBuffer};
pub use source::{ByteSource, SharedBuffer};
