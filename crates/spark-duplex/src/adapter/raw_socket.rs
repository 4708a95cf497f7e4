//! 原生 WebSocket 形态的适配器。
//!
//! - 状态直接来自 `readyState`（0..=3），其他数值报告为 `Unknown`；
//! - `send` 透传原生确认回调；
//! - 事件经 `addEventListener`/`removeEventListener` 订阅，`open` 有效（客户端 socket 可能仍在握手）。

use std::rc::Rc;

use tracing::{trace, warn};

use super::{ListenerTable, translator};
use crate::connection::{Connection, EventKind, Listener, SendCallback};
use crate::endpoint::Endpoint;
use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// 原生 socket 适配器。
pub struct RawSocketAdapter {
    endpoint: Rc<dyn Endpoint>,
    table: ListenerTable,
}

impl RawSocketAdapter {
    /// 包装一个原生 socket。
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
            .unbind_all(|event, native| endpoint.remove_event_listener(event, native));
    }
}

impl Connection for RawSocketAdapter {
    fn status(&self) -> ConnectionStatus {
        match self.endpoint.ready_state() {
            Some(raw) => ConnectionStatus::from_ready_state(raw),
            None => ConnectionStatus::Unknown(u16::MAX),
        }
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        self.endpoint.send(
            &payload,
            Box::new(move |result| on_complete(result.map_err(StreamError::transport))),
        );
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        if let Err(err) = self.endpoint.close(code, reason) {
            warn!(target: "spark_duplex::adapter", error = %err, "raw socket refused close");
        }
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        trace!(target: "spark_duplex::adapter", event = kind.as_str(), "raw socket subscribe");
        let endpoint = &self.endpoint;
        self.table.bind(kind, listener, kind.as_str(), translator(kind), |event, native| {
            endpoint.add_event_listener(event, native)
        });
    }

    fn off(&self, kind: EventKind, listener: &Listener) {
        let endpoint = &self.endpoint;
        self.table.unbind(kind, listener, |event, native| {
            endpoint.remove_event_listener(event, native)
        });
    }
}

impl Drop for RawSocketAdapter {
    fn drop(&mut self) {
        self.detach_all();
    }
}
