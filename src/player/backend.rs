use crate::core::{
    CodecInitError, ContainerInfo, Frame, Packet, PixelFormat, RawFrame, Result, StreamDescriptor,
};
use std::path::Path;
use std::sync::Arc;

/// 容器能力：打开文件并探测流信息
///
/// 不同的实现（FFmpeg、测试用的脚本化容器等）都实现这个接口
pub trait ContainerBackend: Send + Sync {
    /// 打开并探测容器
    ///
    /// 返回：
    /// - Ok(container): 已打开的容器，`info()` 给出流信息
    /// - Err(PlayerError::OpenError): 无法打开或探测失败，不留下任何已打开的资源
    fn open(&self, path: &Path) -> Result<Box<dyn Container>>;
}

/// 已打开的容器，由读取线程独占
pub trait Container: Send {
    fn info(&self) -> &ContainerInfo;

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/// 解码能力：按编解码器标识打开解码上下文
pub trait DecodeBackend: Send + Sync {
    /// 依次完成：查找解码器 → 分配上下文 → 设置流参数 → 打开
    fn open_decoder(
        &self,
        stream: &StreamDescriptor,
    ) -> std::result::Result<Box<dyn DecodeContext>, CodecInitError>;
}

/// 取帧结果
pub enum Receive {
    Frame(RawFrame),
    /// 需要更多输入（EAGAIN）
    NeedMoreInput,
    EndOfStream,
    Error(String),
}

/// 已打开的解码上下文，drop 时释放
pub trait DecodeContext: Send {
    fn send_packet(&mut self, packet: &Packet) -> std::result::Result<(), String>;

    fn receive_frame(&mut self) -> Receive;
}

/// 像素转换能力
pub trait ConvertBackend: Send + Sync {
    /// 以 `frame` 的源格式/尺寸为输入、`target` 为输出创建转换器
    ///
    /// 创建失败返回 None
    fn create(&self, frame: &Frame, target: PixelFormat) -> Option<Box<dyn PixelConverter>>;
}

/// 已配置好的像素转换器，drop 时释放
pub trait PixelConverter: Send {
    /// 输出缓冲每行字节数
    fn stride(&self) -> usize;

    /// 把一帧转换到 `dst`（长度为 stride * height），失败返回 false
    fn convert(&mut self, frame: &Frame, dst: &mut [u8]) -> bool;
}

/// 三种外部能力的组合
#[derive(Clone)]
pub struct MediaBackend {
    pub container: Arc<dyn ContainerBackend>,
    pub decode: Arc<dyn DecodeBackend>,
    pub convert: Arc<dyn ConvertBackend>,
}

impl MediaBackend {
    pub fn new(
        container: Arc<dyn ContainerBackend>,
        decode: Arc<dyn DecodeBackend>,
        convert: Arc<dyn ConvertBackend>,
    ) -> Self {
        Self {
            container,
            decode,
            convert,
        }
    }
}
