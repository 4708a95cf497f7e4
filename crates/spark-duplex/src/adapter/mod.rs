//! 能力适配器：把三类原生连接统一为 [`Connection`] 契约。
//!
//! # 教案级说明
//! - **Why**：原生 socket 用 `addEventListener`、SockJS 用 `on('data')`、Socket.IO 用
//!   `on('message')`/`on('disconnect')`，引擎不应感知这些差异；
//! - **How**：每个适配器包装一个 [`Endpoint`]，并维护一张“契约层监听器 → 原生包装监听器”的映射表。
//!   `off` 按契约层监听器的身份查表，精确退订当初注册的原生包装；
//! - **What**：映射表可整体清空（[`AdaptedConnection::detach_all`]），适配器析构时也会清空，
//!   保证不会有原生监听器比适配器活得更久；
//! - **Trade-offs**：同一监听器对同一事件重复注册视为空操作，而不是像事件发射器那样叠加两次。

mod emitter;
mod polling;
mod raw_socket;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

pub use emitter::EmitterAdapter;
pub use polling::PollingAdapter;
pub use raw_socket::RawSocketAdapter;

use crate::classify::TransportFamily;
use crate::connection::{Connection, ConnectionEvent, EventKind, Listener, SendCallback};
use crate::endpoint::{Endpoint, EndpointError, NativeEvent, NativeListener};
use crate::status::ConnectionStatus;

/// 一条注册记录。
struct Binding {
    kind: EventKind,
    listener: Listener,
    native: NativeListener,
    event: &'static str,
}

/// 契约层监听器到原生监听器的映射表。
#[derive(Default)]
pub(crate) struct ListenerTable {
    bindings: RefCell<Vec<Binding>>,
}

impl ListenerTable {
    fn contains(&self, kind: EventKind, listener: &Listener) -> bool {
        self.bindings
            .borrow()
            .iter()
            .any(|b| b.kind == kind && b.listener == *listener)
    }

    fn remove(&self, kind: EventKind, listener: &Listener) -> Option<Binding> {
        let mut bindings = self.bindings.borrow_mut();
        let index = bindings
            .iter()
            .position(|b| b.kind == kind && b.listener == *listener)?;
        Some(bindings.remove(index))
    }

    fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// 包装并注册一个契约层监听器。
    ///
    /// `translate` 把原生事件翻译为契约事件，返回 `None` 的事件被忽略；
    /// `register` 负责调用原生订阅方法。注册失败只记录告警，不写入映射表。
    fn bind(
        &self,
        kind: EventKind,
        listener: &Listener,
        event: &'static str,
        translate: fn(&NativeEvent) -> Option<ConnectionEvent>,
        register: impl FnOnce(&'static str, NativeListener) -> Result<(), EndpointError>,
    ) {
        if self.contains(kind, listener) {
            return;
        }
        let target = listener.clone();
        let native = NativeListener::new(move |event| {
            if let Some(translated) = translate(event) {
                target.call(&translated);
            }
        });
        match register(event, native.clone()) {
            Ok(()) => self.bindings.borrow_mut().push(Binding {
                kind,
                listener: listener.clone(),
                native,
                event,
            }),
            Err(err) => warn!(
                target: "spark_duplex::adapter",
                event,
                error = %err,
                "native subscription rejected"
            ),
        }
    }

    fn unbind(
        &self,
        kind: EventKind,
        listener: &Listener,
        unregister: impl FnOnce(&'static str, &NativeListener) -> Result<(), EndpointError>,
    ) {
        let Some(binding) = self.remove(kind, listener) else {
            return;
        };
        if let Err(err) = unregister(binding.event, &binding.native) {
            warn!(
                target: "spark_duplex::adapter",
                event = binding.event,
                error = %err,
                "native unsubscription rejected"
            );
        }
    }

    fn unbind_all(
        &self,
        unregister: impl Fn(&'static str, &NativeListener) -> Result<(), EndpointError>,
    ) {
        let drained: Vec<Binding> = self.bindings.borrow_mut().drain(..).collect();
        for binding in drained {
            if let Err(err) = unregister(binding.event, &binding.native) {
                warn!(
                    target: "spark_duplex::adapter",
                    event = binding.event,
                    error = %err,
                    "native unsubscription rejected during teardown"
                );
            }
        }
    }
}

fn translator(kind: EventKind) -> fn(&NativeEvent) -> Option<ConnectionEvent> {
    match kind {
        EventKind::Message => translate_message,
        EventKind::Open => translate_open,
        EventKind::Close => translate_close,
    }
}

fn translate_message(event: &NativeEvent) -> Option<ConnectionEvent> {
    match event {
        NativeEvent::Message { data } | NativeEvent::Data(data) => Some(ConnectionEvent::Message {
            data: data.clone(),
        }),
        _ => None,
    }
}

fn translate_open(event: &NativeEvent) -> Option<ConnectionEvent> {
    match event {
        NativeEvent::Open => Some(ConnectionEvent::Open),
        _ => None,
    }
}

fn translate_close(event: &NativeEvent) -> Option<ConnectionEvent> {
    match event {
        NativeEvent::Close { code, reason } => Some(ConnectionEvent::Close {
            code: *code,
            reason: reason.clone(),
        }),
        NativeEvent::Disconnect { reason } => Some(ConnectionEvent::Close {
            code: None,
            reason: reason.clone(),
        }),
        _ => None,
    }
}

/// 分类器产出的带标签适配器。
pub enum AdaptedConnection {
    /// 原生 WebSocket 形态。
    RawSocket(RawSocketAdapter),
    /// SockJS 服务端连接形态。
    PollingFallback(PollingAdapter),
    /// Socket.IO socket 形态。
    EventEmitter(EmitterAdapter),
}

impl AdaptedConnection {
    /// 用指定家族的适配器包装连接对象，不做形态校验。
    pub fn adapt(family: TransportFamily, endpoint: Rc<dyn Endpoint>) -> Self {
        match family {
            TransportFamily::RawSocket => Self::RawSocket(RawSocketAdapter::new(endpoint)),
            TransportFamily::PollingFallback => {
                Self::PollingFallback(PollingAdapter::new(endpoint))
            }
            TransportFamily::EventEmitter => Self::EventEmitter(EmitterAdapter::new(endpoint)),
        }
    }

    /// 适配器所属家族。
    pub fn family(&self) -> TransportFamily {
        match self {
            Self::RawSocket(_) => TransportFamily::RawSocket,
            Self::PollingFallback(_) => TransportFamily::PollingFallback,
            Self::EventEmitter(_) => TransportFamily::EventEmitter,
        }
    }

    /// 当前映射表中的注册数。
    pub fn bound_listeners(&self) -> usize {
        match self {
            Self::RawSocket(a) => a.bound_listeners(),
            Self::PollingFallback(a) => a.bound_listeners(),
            Self::EventEmitter(a) => a.bound_listeners(),
        }
    }

    /// 退订映射表中的全部原生监听器并清空映射表。
    pub fn detach_all(&self) {
        match self {
            Self::RawSocket(a) => a.detach_all(),
            Self::PollingFallback(a) => a.detach_all(),
            Self::EventEmitter(a) => a.detach_all(),
        }
    }

    fn as_connection(&self) -> &dyn Connection {
        match self {
            Self::RawSocket(a) => a,
            Self::PollingFallback(a) => a,
            Self::EventEmitter(a) => a,
        }
    }
}

impl Connection for AdaptedConnection {
    fn status(&self) -> ConnectionStatus {
        self.as_connection().status()
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        self.as_connection().send(payload, on_complete)
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.as_connection().close(code, reason)
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        self.as_connection().on(kind, listener)
    }

    fn off(&self, kind: EventKind, listener: &Listener) {
        self.as_connection().off(kind, listener)
    }
}
