//! 关闭码与关闭原因。
//!
//! # 教案级说明
//! - **Why**：关闭码是协议层整数（RFC 6455 §7.4），对端据此判断是正常结束还是异常；
//!   引擎的每一条终止路径都必须给出确定的 `(code, reason)`；
//! - **What**：[`CloseFrame`] 承载一对码/原因，并集中定义 `end()`/`destroy()` 的取值表；
//! - **How**：`destroy(error)` 优先使用错误自带的关闭帧，否则落到 1011/"stream error"。

use crate::error::StreamError;

/// 一次关闭请求携带的码与原因。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CloseFrame {
    /// 协议层关闭码。
    pub code: u16,
    /// 人类可读的关闭原因，可为空串。
    pub reason: String,
}

impl CloseFrame {
    /// 正常关闭。
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// 未收到状态码；用于不带错误的主动销毁。
    pub const NO_STATUS_RECEIVED: u16 = 1005;
    /// 内部错误。
    pub const INTERNAL_ERROR: u16 = 1011;

    /// `end()` 使用的原因文本。
    pub const STREAM_END: &'static str = "stream end";
    /// `destroy(error)` 的默认原因文本。
    pub const STREAM_ERROR: &'static str = "stream error";

    /// 构造任意关闭帧。
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// 优雅结束：1000 / "stream end"。
    pub fn stream_end() -> Self {
        Self::new(Self::NORMAL_CLOSURE, Self::STREAM_END)
    }

    /// 根据销毁原因计算关闭帧。
    ///
    /// - 无错误：1005 / ""；
    /// - 错误自带关闭帧：原样使用；
    /// - 其他错误：1011 / "stream error"。
    pub fn for_destroy(error: Option<&StreamError>) -> Self {
        match error {
            None => Self::new(Self::NO_STATUS_RECEIVED, ""),
            Some(err) => err
                .close_frame()
                .cloned()
                .unwrap_or_else(|| Self::new(Self::INTERNAL_ERROR, Self::STREAM_ERROR)),
        }
    }

    /// 原因为空时返回 `None`，便于传给只接受可选原因的原生 `close`。
    pub fn reason_opt(&self) -> Option<&str> {
        if self.reason.is_empty() {
            None
        } else {
            Some(&self.reason)
        }
    }
}
