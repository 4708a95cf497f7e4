//! Socket.IO socket 的适配器。
//!
//! # 教案级说明
//! - **Why**：Socket.IO 只暴露布尔 `connected`，没有四值状态；
//! - **How**：`connected == true` 映射为 OPEN，否则映射为 CLOSED；缺少 `connected` 成员时报告
//!   `Unknown(u16::MAX)`，与另外两个适配器缺少 `readyState` 时一致；
//! - **Trade-offs**：握手中的 socket 与正在断开的 socket 都会被报告为 CLOSED，
//!   在此期间的写入直接以 [`StreamError::Closed`] 失败。接受这一折叠，因为服务端
//!   socket 交给应用时总是已连接；
//! - **What**：`close` 调用 `disconnect(true)`，关闭码与原因无处可放，只记录 debug 日志。

use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::{ListenerTable, translator};
use crate::connection::{Connection, EventKind, Listener, SendCallback};
use crate::endpoint::Endpoint;
use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// Socket.IO 消息使用的事件名。
const MESSAGE_EVENT: &str = "message";

/// Socket.IO socket 适配器。
pub struct EmitterAdapter {
    endpoint: Rc<dyn Endpoint>,
    table: ListenerTable,
}

impl EmitterAdapter {
    /// 包装一个 Socket.IO socket。
    pub fn new(endpoint: Rc<dyn Endpoint>) -> Self {
        Self {
            endpoint,
            table: ListenerTable::default(),
        }
    }

    /// 映射表中的注册数。
    pub fn bound_listeners(&self) -> usize {
        self.table.len()
    }

    /// 退订全部原生监听器。
    pub fn detach_all(&self) {
        let endpoint = &self.endpoint;
        self.table
            .unbind_all(|event, native| endpoint.off(event, native));
    }

    fn native_event(kind: EventKind) -> Option<&'static str> {
        match kind {
            EventKind::Message => Some(MESSAGE_EVENT),
            EventKind::Close => Some("disconnect"),
            EventKind::Open => None,
        }
    }
}

impl Connection for EmitterAdapter {
    fn status(&self) -> ConnectionStatus {
        match self.endpoint.connected() {
            Some(connected) => ConnectionStatus::from_connected(connected),
            None => ConnectionStatus::Unknown(u16::MAX),
        }
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        match self.endpoint.emit(MESSAGE_EVENT, &payload) {
            Ok(()) => on_complete(Ok(())),
            Err(err) => on_complete(Err(StreamError::transport(err))),
        }
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        if code.is_some() || reason.is_some_and(|r| !r.is_empty()) {
            debug!(
                target: "spark_duplex::adapter",
                code = ?code,
                reason = reason.unwrap_or_default(),
                "socket.io disconnect carries no close frame"
            );
        }
        if let Err(err) = self.endpoint.disconnect(true) {
            warn!(target: "spark_duplex::adapter", error = %err, "socket.io socket refused disconnect");
        }
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        let Some(event) = Self::native_event(kind) else {
            trace!(target: "spark_duplex::adapter", "socket.io sockets are already connected; ignoring open subscription");
            return;
        };
        let endpoint = &self.endpoint;
        self.table
            .bind(kind, listener, event, translator(kind), |event, native| {
                endpoint.on(event, native)
            });
    }

    fn off(&self, kind: EventKind, listener: &Listener) {
        if Self::native_event(kind).is_none() {
            return;
        }
        let endpoint = &self.endpoint;
        self.table
            .unbind(kind, listener, |event, native| endpoint.off(event, native));
    }
}

impl Drop for EmitterAdapter {
    fn drop(&mut self) {
        self.detach_all();
    }
}
