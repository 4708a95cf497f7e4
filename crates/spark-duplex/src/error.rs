//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义双工流对外暴露的错误语义，调用方会对 [`StreamError::Closed`] 等变体做模式匹配；
//! - 每个变体提供稳定错误码（[`StreamError::code`]），便于日志与告警聚合。
//!
//! ## 传播策略（What）
//! - 写入期错误（序列化、已关闭、意外状态、传输失败）只回传给对应写入的完成回调，并以
//!   `Error` 事件通知，不终止流；
//! - 读路径的反序列化错误一律销毁流，因为无法归因到某次调用；
//! - 错误类型实现 `Clone`，同一个终止错误既要交给事件观察者，也要交给拉模式消费者。

use thiserror::Error;

use crate::close::CloseFrame;

/// 编解码失败的阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecErrorKind {
    /// 值 → 文本失败。
    Serialize,
    /// 文本 → 值失败。
    Deserialize,
    /// 文本解析成功，但得到的是“空值”。
    Absent,
}

/// 编解码器返回的错误。
///
/// 只保留可读描述而不持有底层错误对象，使其保持 `Clone + Eq`。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct CodecError {
    kind: CodecErrorKind,
    message: String,
}

impl CodecError {
    /// 构造编解码错误。
    pub fn new(kind: CodecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 序列化失败。
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::Serialize, message)
    }

    /// 反序列化失败。
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::Deserialize, message)
    }

    /// 解码结果为空值。
    pub fn absent() -> Self {
        Self::new(CodecErrorKind::Absent, "decoded value is null or absent")
    }

    /// 失败阶段。
    pub fn kind(&self) -> CodecErrorKind {
        self.kind
    }

    /// 可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 双工流错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：覆盖分类、编解码、写入与生命周期四类失败，调用方据此区分“可重试的单次写入失败”
///   与“流已终止”；
/// - **契约 (What)**：`Closed` 的展示文本固定为 `"WebSocket CLOSING or CLOSED"`；
///   `Application` 允许携带自定义关闭帧，`destroy` 时会原样下发给对端；
/// - **风险 (Trade-offs)**：`Transport` 只保留文本描述，原生错误对象在适配器边界即被格式化。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamError {
    /// 写入值无法序列化。
    #[error("can't serialize the value")]
    Serialization {
        /// 编解码器给出的原因。
        source: CodecError,
    },

    /// 收到的帧无法反序列化，或解出空值。
    #[error("can't deserialize the value")]
    Deserialization {
        /// 编解码器给出的原因。
        source: CodecError,
    },

    /// 连接处于 CLOSING/CLOSED，或流已被销毁。
    #[error("WebSocket CLOSING or CLOSED")]
    Closed,

    /// `end()` 之后仍尝试写入。
    #[error("write after end")]
    WriteAfterEnd,

    /// 分类器无法识别连接对象的形态。
    #[error("unsupported connection shape: [{members}]")]
    UnsupportedShape {
        /// 探测到的成员列表，逗号分隔。
        members: String,
    },

    /// 调用方给出的传输提示无法识别。
    #[error("unknown adapter type `{hint}`")]
    UnknownAdapterType {
        /// 原始提示字符串。
        hint: String,
    },

    /// 适配器报告了四值枚举之外的状态。
    #[error("unexpected connection status {status}")]
    UnexpectedStatus {
        /// 原生状态数值。
        status: u16,
    },

    /// 底层传输拒绝了一次操作。
    #[error("transport failure: {message}")]
    Transport {
        /// 传输层描述。
        message: String,
    },

    /// 应用层主动给出的错误，可携带关闭帧。
    #[error("{message}")]
    Application {
        /// 错误描述。
        message: String,
        /// `destroy` 时使用的关闭帧；缺省走 1011。
        close: Option<CloseFrame>,
    },
}

impl StreamError {
    /// 构造应用层错误。
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
            close: None,
        }
    }

    /// 为应用层错误附加关闭帧；其他变体原样返回。
    pub fn with_close(self, code: u16, reason: impl Into<String>) -> Self {
        match self {
            Self::Application { message, .. } => Self::Application {
                message,
                close: Some(CloseFrame::new(code, reason)),
            },
            other => other,
        }
    }

    /// 错误自带的关闭帧。
    pub fn close_frame(&self) -> Option<&CloseFrame> {
        match self {
            Self::Application { close, .. } => close.as_ref(),
            _ => None,
        }
    }

    /// 是否为 [`StreamError::Closed`]。
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Serialization { .. } => "duplex.codec.serialize",
            Self::Deserialization { .. } => "duplex.codec.deserialize",
            Self::Closed => "duplex.write.closed",
            Self::WriteAfterEnd => "duplex.write.after_end",
            Self::UnsupportedShape { .. } => "duplex.classify.unsupported_shape",
            Self::UnknownAdapterType { .. } => "duplex.classify.unknown_adapter",
            Self::UnexpectedStatus { .. } => "duplex.connection.unexpected_status",
            Self::Transport { .. } => "duplex.transport.failure",
            Self::Application { .. } => "duplex.application",
        }
    }

    pub(crate) fn transport(err: impl core::fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}
