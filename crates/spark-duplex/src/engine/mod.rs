//! 双工流引擎。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 在适配后的连接之上提供一条结构化值的双工流：写入一个值即发送一帧，收到一帧即读出一个值；
//! - 把“本地结束写入”“对端关闭”“带错误销毁”三条终止路径收敛到同一个终态，
//!   保证 `Close` 恰好一次、监听器不泄漏、关闭码可预期。
//!
//! ## 状态空间（What）
//! - 连接状态（CONNECTING/OPEN/CLOSING/CLOSED）× 流意图（Active/Ending/Destroyed）× 是否已发出 `Close`；
//! - 引擎在构造时注册恰好一个 message 监听器与一个 close 监听器，只在最终拆除时移除；
//! - 另外至多存在一对待发队列监听器（[`pending`]）与一个关闭观察监听器（[`shutdown`]）。
//!
//! ## 逻辑（How）
//! - [`writable`]：串行化写入，同一时刻只有一个写入在途，其余按 FIFO 缓冲；
//! - [`pending`]：CONNECTING 期间的待发队列，握手完成后按序重发；
//! - [`shutdown`]：“关闭底层连接并收尾”的重试协议；
//! - [`readable`]：读侧缓冲、暂停/恢复与 `futures::Stream` 集成。
//!
//! ## 风险提示（Trade-offs）
//! - 所有监听器只持有引擎的 `Weak` 引用：连接不会让被遗弃的引擎存活；
//!   最后一个句柄析构时，引擎从连接上移除自己的全部监听器。

mod events;
mod pending;
mod readable;
mod shutdown;
#[cfg(test)]
mod testing;
mod writable;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use tracing::{debug, trace, warn};

pub use events::{ObserverId, StreamEvent};
pub use writable::Ack;

use crate::classify::classify;
use crate::close::CloseFrame;
use crate::codec::Codec;
use crate::config::DuplexConfig;
use crate::connection::{Connection, ConnectionEvent, EventKind, Listener};
use crate::endpoint::Endpoint;
use crate::error::{CodecError, StreamError};
use crate::status::ConnectionStatus;

use events::Observers;
use pending::PendingQueue;
use readable::Readable;
use shutdown::{Completion, ShutdownRequest, ShutdownWatch};
use writable::Writable;

const TARGET: &str = "spark_duplex::engine";

/// 流意图。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Intent {
    Active,
    Ending,
    Destroyed,
}

/// 引擎生命周期内常驻的一对监听器。
struct LifetimeListeners {
    message: Listener,
    close: Listener,
}

struct State<T> {
    intent: Intent,
    lifetime: Option<LifetimeListeners>,
    pending: Option<PendingQueue>,
    watch: Option<ShutdownWatch>,
    close_emitted: bool,
    writable: Writable<T>,
    readable: Readable<T>,
    observers: Observers<T>,
}

type DeferredTask<C> = Box<dyn FnOnce(&Rc<Inner<C>>)>;

struct Inner<C: Codec> {
    this: Weak<Inner<C>>,
    connection: Rc<dyn Connection>,
    codec: C,
    spawner: Box<dyn LocalSpawn>,
    config: DuplexConfig,
    state: RefCell<State<C::Item>>,
}

/// 结构化值的双工流句柄。
///
/// 句柄可廉价克隆，所有克隆共享同一个引擎；句柄不是 `Send`。
pub struct DuplexStream<C: Codec> {
    inner: Rc<Inner<C>>,
}

impl<C: Codec> Clone for DuplexStream<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Codec> fmt::Debug for DuplexStream<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DuplexStream")
            .field("status", &self.inner.connection.status())
            .field("intent", &state.intent)
            .field("close_emitted", &state.close_emitted)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> DuplexStream<C> {
    /// 在已适配的连接上构造引擎。
    ///
    /// # 契约说明
    /// - **输入**：`connection` 不为引擎独占；`spawner` 承担“下一拍”延迟；
    /// - **后置条件**：连接上新增恰好一个 message 监听器与一个 close 监听器。
    pub fn new(
        connection: Rc<dyn Connection>,
        codec: C,
        spawner: impl LocalSpawn + 'static,
        config: DuplexConfig,
    ) -> Self {
        let paused = config.start_paused;
        let inner = Rc::new_cyclic(|this: &Weak<Inner<C>>| Inner {
            this: this.clone(),
            connection,
            codec,
            spawner: Box::new(spawner),
            config,
            state: RefCell::new(State {
                intent: Intent::Active,
                lifetime: None,
                pending: None,
                watch: None,
                close_emitted: false,
                writable: Writable::default(),
                readable: Readable::new(paused),
                observers: Observers::default(),
            }),
        });
        inner.attach_lifetime();
        debug!(target: TARGET, status = %inner.connection.status(), "duplex stream created");
        Self { inner }
    }

    /// 先按 `config.transport` 分类外部连接对象，再构造引擎。
    pub fn from_endpoint(
        endpoint: Rc<dyn Endpoint>,
        codec: C,
        spawner: impl LocalSpawn + 'static,
        config: DuplexConfig,
    ) -> Result<Self, StreamError> {
        let adapted = classify(endpoint, config.transport)?;
        Ok(Self::new(Rc::new(adapted), codec, spawner, config))
    }

    /// 写入一个值，忽略完成结果（失败仍会以 `Error` 事件通知）。
    pub fn write(&self, value: C::Item) {
        self.inner.write(value, None);
    }

    /// 写入一个值，并在发送完成或失败时调用 `callback`（恰好一次）。
    pub fn write_with(
        &self,
        value: C::Item,
        callback: impl FnOnce(Result<(), StreamError>) + 'static,
    ) {
        self.inner.write(value, Some(Box::new(callback)));
    }

    /// 写入一个值，返回可等待的完成凭据。
    pub fn write_async(&self, value: C::Item) -> Ack {
        let (ack, callback) = Ack::channel();
        self.inner.write(value, Some(callback));
        ack
    }

    /// 结束写侧：已缓冲的写入全部完成后，以 1000/"stream end" 关闭连接。
    pub fn end(&self) {
        self.inner.end(None);
    }

    /// 同 [`Self::end`]，写侧结束（`Finish`）或失败时调用 `callback`。
    pub fn end_with(&self, callback: impl FnOnce(Result<(), StreamError>) + 'static) {
        self.inner.end(Some(Box::new(callback)));
    }

    /// 同 [`Self::end`]，返回可等待的完成凭据。
    pub fn end_async(&self) -> Ack {
        let (ack, callback) = Ack::channel();
        self.inner.end(Some(callback));
        ack
    }

    /// 立即销毁流；重复调用是空操作。
    ///
    /// 关闭码取值：无错误 1005/""；错误自带关闭帧时原样使用；否则 1011/"stream error"。
    pub fn destroy(&self, error: Option<StreamError>) {
        self.inner.destroy(error);
    }

    /// 订阅流事件；若流处于初始的隐式暂停模式，订阅会把它切换为流动模式。
    pub fn subscribe(&self, observer: impl Fn(&StreamEvent<C::Item>) + 'static) -> ObserverId {
        self.inner.subscribe(Rc::new(observer))
    }

    /// 退订；返回是否确实移除了观察者。
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.state.borrow_mut().observers.remove(id)
    }

    /// 显式暂停 `Data` 派发，后续值进入读侧缓冲。
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// 恢复流动模式，并立即派发缓冲中的值。
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// 当前是否没有处于流动模式。
    pub fn is_paused(&self) -> bool {
        self.inner.state.borrow().readable.is_paused()
    }

    /// 拉模式读取一个缓冲值。
    pub fn read(&self) -> Option<C::Item> {
        self.inner.read()
    }

    /// 底层连接的当前状态。
    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// 是否已进入销毁。
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().intent == Intent::Destroyed
    }

    /// 写侧是否已优雅结束（`Finish` 已派发）。
    pub fn is_finished(&self) -> bool {
        self.inner.state.borrow().writable.finished
    }

    /// `Close` 是否已派发。
    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().close_emitted
    }

    /// 读侧缓冲中的值数量。
    pub fn buffered_len(&self) -> usize {
        self.inner.state.borrow().readable.len()
    }

    /// 待发队列中等待握手完成的写入数量。
    pub fn pending_len(&self) -> usize {
        self.inner
            .state
            .borrow()
            .pending
            .as_ref()
            .map_or(0, PendingQueue::len)
    }
}

impl<C: Codec> Inner<C> {
    fn attach_lifetime(self: &Rc<Self>) {
        let weak = self.this.clone();
        let message = Listener::new(move |event| {
            if let (Some(inner), ConnectionEvent::Message { data }) = (weak.upgrade(), event) {
                inner.on_message(data);
            }
        });
        let weak = self.this.clone();
        let close = Listener::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_remote_close(event);
            }
        });
        self.connection.on(EventKind::Message, &message);
        self.connection.on(EventKind::Close, &close);
        self.state.borrow_mut().lifetime = Some(LifetimeListeners { message, close });
    }

    /// 移除常驻监听器；之后收到的消息一律忽略。
    fn teardown_lifetime(&self) {
        let lifetime = self.state.borrow_mut().lifetime.take();
        if let Some(lifetime) = lifetime {
            self.connection.off(EventKind::Message, &lifetime.message);
            self.connection.off(EventKind::Close, &lifetime.close);
            trace!(target: TARGET, "lifetime listeners removed");
        }
    }

    fn on_message(self: &Rc<Self>, data: &str) {
        if self.state.borrow().lifetime.is_none() {
            return;
        }
        match self.codec.deserialize(data) {
            Ok(Some(value)) => self.push_readable(value),
            Ok(None) => self.destroy(Some(StreamError::Deserialization {
                source: CodecError::absent(),
            })),
            Err(source) => self.destroy(Some(StreamError::Deserialization { source })),
        }
    }

    fn on_remote_close(self: &Rc<Self>, event: &ConnectionEvent) {
        if self.state.borrow().intent != Intent::Active {
            return;
        }
        if let ConnectionEvent::Close { code, reason } = event {
            debug!(target: TARGET, code = ?code, reason = %reason, "remote close observed");
        }
        self.destroy(None);
    }

    fn destroy(self: &Rc<Self>, error: Option<StreamError>) {
        let (pending, buffered, end_callbacks) = {
            let mut state = self.state.borrow_mut();
            if state.intent == Intent::Destroyed || state.close_emitted {
                trace!(target: TARGET, "destroy ignored: stream already terminated");
                return;
            }
            state.intent = Intent::Destroyed;
            let pending = state.pending.take();
            let (buffered, end_callbacks) = state.writable.abandon();
            (pending, buffered, end_callbacks)
        };
        debug!(
            target: TARGET,
            error = error.as_ref().map(StreamError::code),
            "destroying duplex stream"
        );

        self.teardown_lifetime();
        if let Some(queue) = pending {
            self.fail_pending(queue);
        }
        self.detach_watch();
        for request in buffered {
            request.fail(StreamError::Closed);
        }
        for callback in end_callbacks {
            callback(Err(StreamError::Closed));
        }

        let frame = CloseFrame::for_destroy(error.as_ref());
        debug!(target: TARGET, code = frame.code, reason = %frame.reason, "close frame chosen for destroy");
        self.shutdown(ShutdownRequest {
            frame,
            completion: Completion::Destroy(error),
        });
    }

    fn emit(&self, event: StreamEvent<C::Item>) {
        let observers = self.state.borrow().observers.snapshot();
        trace!(target: TARGET, event = event.name(), observers = observers.len(), "emit");
        for observer in observers {
            observer(&event);
        }
    }

    fn emit_close_once(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.close_emitted {
                return;
            }
            state.close_emitted = true;
            state.readable.end();
        }
        debug!(target: TARGET, "terminal close");
        self.emit(StreamEvent::Close);
        let released = self.state.borrow_mut().observers.seal();
        trace!(target: TARGET, observers = released.len(), "observers released after close");
        drop(released);
    }

    /// 推迟到调度器的下一拍执行。
    ///
    /// 派生失败时就地执行并记录告警，任务不会丢失。
    fn defer(&self, task: impl FnOnce(&Rc<Self>) + 'static) {
        let slot: Rc<RefCell<Option<DeferredTask<C>>>> =
            Rc::new(RefCell::new(Some(Box::new(task))));
        let scheduled = Rc::clone(&slot);
        let weak = self.this.clone();
        let spawned = self.spawner.spawn_local(async move {
            let task = scheduled.borrow_mut().take();
            if let (Some(task), Some(inner)) = (task, weak.upgrade()) {
                task(&inner);
            }
        });
        if let Err(err) = spawned {
            warn!(target: TARGET, error = %err, "scheduler rejected deferred task; running inline");
            let task = slot.borrow_mut().take();
            if let (Some(task), Some(inner)) = (task, self.this.upgrade()) {
                task(&inner);
            }
        }
    }
}

impl<C: Codec> Drop for Inner<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(lifetime) = state.lifetime.take() {
            self.connection.off(EventKind::Message, &lifetime.message);
            self.connection.off(EventKind::Close, &lifetime.close);
        }
        if let Some(queue) = state.pending.take() {
            for kind in [EventKind::Open, EventKind::Close] {
                self.connection.off(kind, queue.listener());
            }
            queue.fail_all();
        }
        if let Some(watch) = state.watch.take() {
            watch.detach(self.connection.as_ref());
        }
        let (buffered, end_callbacks) = state.writable.abandon();
        for request in buffered {
            request.fail(StreamError::Closed);
        }
        for callback in end_callbacks {
            callback(Err(StreamError::Closed));
        }
        trace!(target: TARGET, "engine dropped; listeners released");
    }
}
