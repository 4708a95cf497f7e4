//! SockJS 服务端连接的适配器。
//!
//! - 服务端连接在移交给应用时已完成握手，因此 `open` 订阅是空操作；
//! - `write` 没有确认回调，调用返回即视为发送完成；
//! - 消息事件名为 `data`，关闭事件名为 `close`。

use std::rc::Rc;

use tracing::{trace, warn};

use super::{ListenerTable, translator};
use crate::connection::{Connection, EventKind, Listener, SendCallback};
use crate::endpoint::Endpoint;
use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// SockJS 连接适配器。
pub struct PollingAdapter {
    endpoint: Rc<dyn Endpoint>,
    table: ListenerTable,
}

impl PollingAdapter {
    /// 包装一个 SockJS 连接。
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
            EventKind::Message => Some("data"),
            EventKind::Close => Some("close"),
            EventKind::Open => None,
        }
    }
}

impl Connection for PollingAdapter {
    fn status(&self) -> ConnectionStatus {
        match self.endpoint.ready_state() {
            Some(raw) => ConnectionStatus::from_ready_state(raw),
            None => ConnectionStatus::Unknown(u16::MAX),
        }
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        // 返回值只是背压提示，这里不据此延后回调。
        match self.endpoint.write(&payload) {
            Ok(_) => on_complete(Ok(())),
            Err(err) => on_complete(Err(StreamError::transport(err))),
        }
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        if let Err(err) = self.endpoint.close(code, reason) {
            warn!(target: "spark_duplex::adapter", error = %err, "sockjs connection refused close");
        }
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        let Some(event) = Self::native_event(kind) else {
            trace!(target: "spark_duplex::adapter", "sockjs connections are already open; ignoring open subscription");
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

impl Drop for PollingAdapter {
    fn drop(&mut self) {
        self.detach_all();
    }
}
