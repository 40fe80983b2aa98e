// 会话、调度与输出

pub mod cue;
pub mod output;
pub mod scheduler;
pub mod session;
pub mod subtitle;

pub use cue::{Cue, CueContent, CueTrack, SubtitleFormat};
pub use output::{AudioChunk, AudioOutput, VideoOutput};
pub use session::Session;
pub use subtitle::{blend_bitmap, SubtitleCompositor};
