//! 集成测试共享的脚本化连接对象。
//!
//! # 教案级注释
//! - **Why**：引擎只通过 [`Endpoint`] 形态接触外部连接，测试用可控的替身即可覆盖全部时序；
//! - **How**：三个替身分别模拟原生 socket、SockJS 服务端连接与 Socket.IO socket，记录发送与关闭，
//!   并按事件名统计监听器数量，用于断言“无监听器泄漏”；
//! - **What**：
//!   - [`MockSocket`]：`close` 只把状态推进到 CLOSING，需调用 [`MockSocket::complete_close`] 才派发 `close`；
//!     派发时跳过已被移除的监听器（DOM 语义）；
//!   - [`MockSockJs`]：同样两段式关闭，派发使用快照（事件发射器语义）；
//!   - [`MockSocketIo`]：`disconnect` 同步派发 `disconnect`，用于覆盖重入路径。

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;
use spark_duplex::{
    Codec, DuplexConfig, DuplexStream, Endpoint, EndpointError, Member, MemberSet, NativeEvent,
    NativeListener, StreamError, StreamEvent, endpoint::SendAck,
};

/// 按事件名登记的原生监听器。
#[derive(Default)]
pub struct Registry {
    listeners: RefCell<Vec<(String, NativeListener)>>,
}

impl Registry {
    fn add(&self, event: &str, listener: NativeListener) -> Result<(), EndpointError> {
        self.listeners
            .borrow_mut()
            .push((event.to_owned(), listener));
        Ok(())
    }

    fn remove(&self, event: &str, listener: &NativeListener) -> Result<(), EndpointError> {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(index) = listeners
            .iter()
            .position(|(name, existing)| name == event && existing == listener)
        {
            listeners.remove(index);
        }
        Ok(())
    }

    fn is_registered(&self, event: &str, listener: &NativeListener) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(name, existing)| name == event && existing == listener)
    }

    /// 指定事件上的监听器数量。
    pub fn count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// 全部监听器数量。
    pub fn total(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// 先取快照再派发，派发期间不持有借用，监听器可以增删订阅。
    fn fire(&self, event: &str, payload: &NativeEvent, skip_removed: bool) {
        let snapshot: Vec<NativeListener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            if skip_removed && !self.is_registered(event, &listener) {
                continue;
            }
            listener.call(payload);
        }
    }
}

/// 原生 WebSocket 替身。
pub struct MockSocket {
    ready_state: Cell<u16>,
    pub sent: RefCell<Vec<String>>,
    pub closes: RefCell<Vec<(Option<u16>, String)>>,
    pub registry: Registry,
    reject_sends: Cell<bool>,
}

impl MockSocket {
    fn with_state(ready_state: u16) -> Rc<Self> {
        Rc::new(Self {
            ready_state: Cell::new(ready_state),
            sent: RefCell::default(),
            closes: RefCell::default(),
            registry: Registry::default(),
            reject_sends: Cell::new(false),
        })
    }

    /// 握手进行中的 socket。
    pub fn connecting() -> Rc<Self> {
        Self::with_state(0)
    }

    /// 已打开的 socket。
    pub fn open() -> Rc<Self> {
        Self::with_state(1)
    }

    /// 强制设置原生状态值（包括非法值）。
    pub fn set_ready_state(&self, state: u16) {
        self.ready_state.set(state);
    }

    /// 之后的发送都以原生错误确认。
    pub fn reject_sends(&self) {
        self.reject_sends.set(true);
    }

    /// 握手完成。
    pub fn simulate_open(&self) {
        self.ready_state.set(1);
        self.registry.fire("open", &NativeEvent::Open, true);
    }

    /// 完成由本地发起的关闭，回显最近一次 `close` 的码与原因。
    pub fn complete_close(&self) {
        let (code, reason) = self
            .closes
            .borrow()
            .last()
            .cloned()
            .unwrap_or((None, String::new()));
        self.ready_state.set(3);
        self.registry
            .fire("close", &NativeEvent::Close { code, reason }, true);
    }

    /// 对端关闭。
    pub fn simulate_remote_close(&self, code: u16, reason: &str) {
        self.ready_state.set(3);
        self.registry.fire(
            "close",
            &NativeEvent::Close {
                code: Some(code),
                reason: reason.to_owned(),
            },
            true,
        );
    }

    /// 收到一帧文本。
    pub fn deliver(&self, data: &str) {
        self.registry.fire(
            "message",
            &NativeEvent::Message {
                data: data.to_owned(),
            },
            true,
        );
    }

    /// 记录到的关闭帧（原因缺省记为空串）。
    pub fn last_close(&self) -> Option<(Option<u16>, String)> {
        self.closes.borrow().last().cloned()
    }
}

impl Endpoint for MockSocket {
    fn members(&self) -> MemberSet {
        MemberSet::new()
            .with(Member::ReadyState)
            .with(Member::Send)
            .with(Member::Close)
            .with(Member::AddEventListener)
            .with(Member::RemoveEventListener)
    }

    fn ready_state(&self) -> Option<u16> {
        Some(self.ready_state.get())
    }

    fn send(&self, payload: &str, ack: SendAck) {
        if self.reject_sends.get() {
            ack(Err(EndpointError::Rejected("send buffer full".into())));
            return;
        }
        self.sent.borrow_mut().push(payload.to_owned());
        ack(Ok(()));
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), EndpointError> {
        self.closes
            .borrow_mut()
            .push((code, reason.unwrap_or_default().to_owned()));
        self.ready_state.set(2);
        Ok(())
    }

    fn add_event_listener(&self, event: &str, listener: NativeListener) -> Result<(), EndpointError> {
        self.registry.add(event, listener)
    }

    fn remove_event_listener(
        &self,
        event: &str,
        listener: &NativeListener,
    ) -> Result<(), EndpointError> {
        self.registry.remove(event, listener)
    }
}

/// SockJS 服务端连接替身，交付时已处于 OPEN。
pub struct MockSockJs {
    ready_state: Cell<u16>,
    pub written: RefCell<Vec<String>>,
    pub closes: RefCell<Vec<(Option<u16>, String)>>,
    pub registry: Registry,
}

impl MockSockJs {
    /// 已打开的连接。
    pub fn open() -> Rc<Self> {
        Rc::new(Self {
            ready_state: Cell::new(1),
            written: RefCell::default(),
            closes: RefCell::default(),
            registry: Registry::default(),
        })
    }

    /// 完成本地发起的关闭。
    pub fn complete_close(&self) {
        let (code, reason) = self
            .closes
            .borrow()
            .last()
            .cloned()
            .unwrap_or((None, String::new()));
        self.ready_state.set(3);
        self.registry
            .fire("close", &NativeEvent::Close { code, reason }, false);
    }

    /// 收到一帧文本。
    pub fn deliver(&self, data: &str) {
        self.registry
            .fire("data", &NativeEvent::Data(data.to_owned()), false);
    }
}

impl Endpoint for MockSockJs {
    fn members(&self) -> MemberSet {
        MemberSet::new()
            .with(Member::ReadyState)
            .with(Member::Write)
            .with(Member::Close)
            .with(Member::On)
            .with(Member::Off)
    }

    fn ready_state(&self) -> Option<u16> {
        Some(self.ready_state.get())
    }

    fn write(&self, payload: &str) -> Result<bool, EndpointError> {
        self.written.borrow_mut().push(payload.to_owned());
        Ok(true)
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), EndpointError> {
        self.closes
            .borrow_mut()
            .push((code, reason.unwrap_or_default().to_owned()));
        self.ready_state.set(2);
        Ok(())
    }

    fn on(&self, event: &str, listener: NativeListener) -> Result<(), EndpointError> {
        self.registry.add(event, listener)
    }

    fn off(&self, event: &str, listener: &NativeListener) -> Result<(), EndpointError> {
        self.registry.remove(event, listener)
    }
}

/// Socket.IO socket 替身，交付时已连接。
pub struct MockSocketIo {
    connected: Cell<bool>,
    pub emitted: RefCell<Vec<(String, String)>>,
    pub disconnects: Cell<usize>,
    pub registry: Registry,
}

impl MockSocketIo {
    /// 已连接的 socket。
    pub fn connected() -> Rc<Self> {
        Rc::new(Self {
            connected: Cell::new(true),
            emitted: RefCell::default(),
            disconnects: Cell::new(0),
            registry: Registry::default(),
        })
    }

    /// 收到一条 `message`。
    pub fn deliver(&self, data: &str) {
        self.registry.fire(
            "message",
            &NativeEvent::Message {
                data: data.to_owned(),
            },
            false,
        );
    }

    /// 服务端主动断开。
    pub fn simulate_server_disconnect(&self) {
        self.connected.set(false);
        self.registry.fire(
            "disconnect",
            &NativeEvent::Disconnect {
                reason: "server namespace disconnect".into(),
            },
            false,
        );
    }
}

impl Endpoint for MockSocketIo {
    fn members(&self) -> MemberSet {
        MemberSet::new()
            .with(Member::Id)
            .with(Member::Connected)
            .with(Member::Emit)
            .with(Member::On)
            .with(Member::Off)
            .with(Member::Disconnect)
    }

    fn id(&self) -> Option<String> {
        Some("mock-socket-1".into())
    }

    fn connected(&self) -> Option<bool> {
        Some(self.connected.get())
    }

    fn emit(&self, event: &str, payload: &str) -> Result<(), EndpointError> {
        if !self.connected.get() {
            return Err(EndpointError::Rejected("socket is disconnected".into()));
        }
        self.emitted
            .borrow_mut()
            .push((event.to_owned(), payload.to_owned()));
        Ok(())
    }

    fn disconnect(&self, _close: bool) -> Result<(), EndpointError> {
        self.disconnects.set(self.disconnects.get() + 1);
        if self.connected.replace(false) {
            self.registry.fire(
                "disconnect",
                &NativeEvent::Disconnect {
                    reason: "io server disconnect".into(),
                },
                false,
            );
        }
        Ok(())
    }

    fn on(&self, event: &str, listener: NativeListener) -> Result<(), EndpointError> {
        self.registry.add(event, listener)
    }

    fn off(&self, event: &str, listener: &NativeListener) -> Result<(), EndpointError> {
        self.registry.remove(event, listener)
    }
}

/// 在连接对象上构造 JSON 流。
pub fn json_stream(
    endpoint: Rc<dyn Endpoint>,
    pool: &LocalPool,
) -> DuplexStream<spark_duplex::JsonCodec> {
    DuplexStream::from_endpoint(
        endpoint,
        spark_duplex::JsonCodec::default(),
        pool.spawner(),
        DuplexConfig::default(),
    )
    .expect("替身形态应被识别")
}

/// 记录流事件。
pub fn record<C>(stream: &DuplexStream<C>) -> Rc<RefCell<Vec<StreamEvent<C::Item>>>>
where
    C: Codec,
    C::Item: Clone,
{
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    stream.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

/// 事件名序列，便于断言顺序。
pub fn names<T>(events: &RefCell<Vec<StreamEvent<T>>>) -> Vec<&'static str> {
    events.borrow().iter().map(StreamEvent::name).collect()
}

/// 收集完成回调结果的容器。
pub type AckLog = Rc<RefCell<Vec<Result<(), StreamError>>>>;

/// 生成一个把结果写入 `log` 的回调。
pub fn ack_into(log: &AckLog) -> impl FnOnce(Result<(), StreamError>) + 'static {
    let log = Rc::clone(log);
    move |result| log.borrow_mut().push(result)
}
