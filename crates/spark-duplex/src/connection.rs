//! 统一能力契约。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 引擎只依赖一组最小能力：查询状态、发送、关闭、订阅/退订三类事件；
//! - 任何连接都可以直接实现 [`Connection`]，也可以经由 [`crate::adapter`] 适配得到。
//!
//! ## 契约说明（What）
//! - `status`：只读，返回四值之一（或 `Unknown` 表示适配器缺陷）；
//! - `send`：`on_complete` 恰好调用一次，成功为 `Ok(())`，失败为 `Err`，绝不 panic；
//! - `close`：发起关闭，完成后异步派发 [`ConnectionEvent::Close`]；
//! - `on`/`off`：以 [`Listener`] 的身份增删订阅；对未注册的监听器调用 `off` 是空操作。
//!
//! ## 风险提示（Trade-offs）
//! - 连接不为引擎独占，其他消费者可能同时订阅；实现不得假设自己是唯一监听者。

use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// 发送完成回调。
pub type SendCallback = Box<dyn FnOnce(Result<(), StreamError>)>;

/// 可订阅的事件种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// 收到一帧文本。
    Message,
    /// 握手完成。
    Open,
    /// 连接关闭。
    Close,
}

impl EventKind {
    /// 事件名。
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Open => "open",
            EventKind::Close => "close",
        }
    }
}

/// 适配后的连接事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 一帧文本。
    Message {
        /// 帧内容。
        data: String,
    },
    /// 握手完成。
    Open,
    /// 连接关闭。
    Close {
        /// 关闭码；不支持关闭码的传输为 `None`。
        code: Option<u16>,
        /// 关闭原因。
        reason: String,
    },
}

impl ConnectionEvent {
    /// 事件所属种类。
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Message { .. } => EventKind::Message,
            ConnectionEvent::Open => EventKind::Open,
            ConnectionEvent::Close { .. } => EventKind::Close,
        }
    }
}

/// 契约层监听器，身份按内部 `Rc` 的数据指针比较。
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&ConnectionEvent)>);

impl Listener {
    /// 包装一个闭包。
    pub fn new(f: impl Fn(&ConnectionEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// 派发事件。
    pub fn call(&self, event: &ConnectionEvent) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// 引擎所需的最小连接能力。
pub trait Connection {
    /// 当前状态。
    fn status(&self) -> ConnectionStatus;

    /// 发送一帧文本。
    fn send(&self, payload: String, on_complete: SendCallback);

    /// 发起关闭。
    fn close(&self, code: Option<u16>, reason: Option<&str>);

    /// 订阅事件。
    fn on(&self, kind: EventKind, listener: &Listener);

    /// 退订事件。
    fn off(&self, kind: EventKind, listener: &Listener);
}

impl<T: Connection + ?Sized> Connection for Rc<T> {
    fn status(&self) -> ConnectionStatus {
        (**self).status()
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        (**self).send(payload, on_complete)
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        (**self).close(code, reason)
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        (**self).on(kind, listener)
    }

    fn off(&self, kind: EventKind, listener: &Listener) {
        (**self).off(kind, listener)
    }
}
