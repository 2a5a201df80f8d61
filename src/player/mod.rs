// 播放流水线：解封装 → 解码 → 呈现

pub mod backend;
pub mod codec;
pub mod decoder;
pub mod demuxer;
pub mod manager;
pub mod presenter;
pub mod video_output;
pub mod worker;

pub use backend::{
    Container, ContainerBackend, ConvertBackend, DecodeBackend, DecodeContext, MediaBackend,
    PixelConverter, Receive,
};
pub use codec::{CodecState, CodecUnit};
pub use decoder::Decoder;
pub use demuxer::Demuxer;
pub use manager::Player;
pub use presenter::Presenter;
pub use video_output::VideoOutput;
pub use worker::{StopOutcome, WorkerThread};
