// 核心数据结构和类型定义

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod media;
pub mod queue;
pub mod stats;
pub mod types;

pub use cancel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use media::*;
pub use queue::*;
pub use stats::*;
pub use types::*;

use std::process;
use std::thread;

/// 日志前缀：进程号 + 线程名/ID
pub(crate) fn log_ctx() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => format!("[pid:{} {}]", process::id(), name),
        None => format!("[pid:{} tid:{:?}]", process::id(), current.id()),
    }
}
