//! 引擎单元测试共用的脚本化连接。

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::LocalPool;

use super::DuplexStream;
use crate::close::CloseFrame;
use crate::codec::TextCodec;
use crate::config::DuplexConfig;
use crate::connection::{Connection, ConnectionEvent, EventKind, Listener, SendCallback};
use crate::status::ConnectionStatus;

/// 直接实现契约的最小连接：可控状态、记录发送与监听器。
pub(super) struct ScriptedConnection {
    pub(super) status: RefCell<ConnectionStatus>,
    pub(super) sent: RefCell<Vec<String>>,
    pub(super) closes: RefCell<Vec<CloseFrame>>,
    listeners: RefCell<Vec<(EventKind, Listener)>>,
}

impl ScriptedConnection {
    pub(super) fn new(status: ConnectionStatus) -> Rc<Self> {
        Rc::new(Self {
            status: RefCell::new(status),
            sent: RefCell::default(),
            closes: RefCell::default(),
            listeners: RefCell::default(),
        })
    }

    pub(super) fn set_status(&self, status: ConnectionStatus) {
        *self.status.borrow_mut() = status;
    }

    pub(super) fn fire(&self, event: ConnectionEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == event.kind())
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener.call(&event);
        }
    }

    pub(super) fn count(&self, kind: EventKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl Connection for ScriptedConnection {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn send(&self, payload: String, on_complete: SendCallback) {
        self.sent.borrow_mut().push(payload);
        on_complete(Ok(()));
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.closes.borrow_mut().push(CloseFrame::new(
            code.unwrap_or_default(),
            reason.unwrap_or_default(),
        ));
        self.set_status(ConnectionStatus::Closing);
    }

    fn on(&self, kind: EventKind, listener: &Listener) {
        self.listeners.borrow_mut().push((kind, listener.clone()));
    }

    fn off(&self, kind: EventKind, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(index) = listeners
            .iter()
            .position(|(k, l)| *k == kind && l == listener)
        {
            listeners.remove(index);
        }
    }
}

pub(super) fn text_stream(
    connection: &Rc<ScriptedConnection>,
    pool: &LocalPool,
    config: DuplexConfig,
) -> DuplexStream<TextCodec> {
    DuplexStream::new(connection.clone(), TextCodec, pool.spawner(), config)
}
