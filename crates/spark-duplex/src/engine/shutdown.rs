//! 关闭时序：“关闭底层连接并收尾”的重试协议。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 结束写侧、销毁、对端关闭三条路径都要等连接真正进入 CLOSED 才能发出终止事件；
//! - 连接可能处于任意状态，且关闭可能由任一方发起，需要一个与状态无关的收敛过程。
//!
//! ## 逻辑（How）
//! - 每次尝试先摘下上一次尝试的观察监听器（同一时刻至多一个活跃尝试），再按状态分支：
//!   - CONNECTING：同时观察 `open` 与 `close`，首次触发后重试；
//!   - OPEN：观察 `close` 并调用 `close(code, reason)` 发起关闭；
//!   - CLOSING：只观察 `close`；
//!   - CLOSED：拆除常驻监听器，下一拍完成请求并发出一次 `Close`；
//!   - 其他：下一拍以“意外状态”完成请求。
//! - 观察监听器是一次性的：请求放在共享槽位中，触发时取走；被摘下的监听器即使仍在某个
//!   派发快照里被调用，也只会看到空槽位。
//!
//! ## 风险提示（Trade-offs）
//! - CLOSED 分支推迟到下一拍，是为了让同一拍内的 `Finish` 先于 `Close` 被观察到。

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::{Inner, Intent, StreamEvent, TARGET};
use crate::close::CloseFrame;
use crate::codec::Codec;
use crate::connection::{Connection, EventKind, Listener};
use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// 关闭完成后要做的收尾。
pub(super) enum Completion {
    /// 优雅结束：发出 `Finish` 并完成结束回调。
    End,
    /// 销毁：发出携带的错误（如有）。
    Destroy(Option<StreamError>),
}

/// 一次关闭尝试。
pub(super) struct ShutdownRequest {
    pub(super) frame: CloseFrame,
    pub(super) completion: Completion,
}

type RequestSlot = Rc<RefCell<Option<ShutdownRequest>>>;

/// 当前活跃尝试挂在连接上的一次性监听器。
pub(super) struct ShutdownWatch {
    listener: Listener,
    kinds: &'static [EventKind],
    slot: RequestSlot,
}

impl ShutdownWatch {
    /// 取消请求并退订。
    pub(super) fn detach(self, connection: &dyn Connection) {
        let cancelled = self.slot.borrow_mut().take();
        for kind in self.kinds {
            connection.off(*kind, &self.listener);
        }
        if cancelled.is_some() {
            trace!(target: TARGET, "superseded shutdown attempt detached");
        }
    }
}

impl<C: Codec> Inner<C> {
    pub(super) fn shutdown(self: &Rc<Self>, request: ShutdownRequest) {
        self.detach_watch();
        let status = self.connection.status();
        debug!(
            target: TARGET,
            status = %status,
            code = request.frame.code,
            reason = %request.frame.reason,
            "shutdown attempt"
        );
        match status {
            ConnectionStatus::Connecting => {
                self.attach_watch(request, &[EventKind::Open, EventKind::Close]);
            }
            ConnectionStatus::Open => {
                let frame = request.frame.clone();
                self.attach_watch(request, &[EventKind::Close]);
                self.connection.close(Some(frame.code), frame.reason_opt());
            }
            ConnectionStatus::Closing => {
                self.attach_watch(request, &[EventKind::Close]);
            }
            ConnectionStatus::Closed => {
                self.teardown_lifetime();
                self.defer(move |inner| inner.complete_shutdown(request.completion, Ok(())));
            }
            ConnectionStatus::Unknown(status) => {
                self.defer(move |inner| {
                    inner.complete_shutdown(
                        request.completion,
                        Err(StreamError::UnexpectedStatus { status }),
                    )
                });
            }
        }
    }

    /// 摘下当前活跃尝试的监听器（如有），其请求随之作废。
    pub(super) fn detach_watch(&self) {
        let watch = self.state.borrow_mut().watch.take();
        if let Some(watch) = watch {
            watch.detach(self.connection.as_ref());
        }
    }

    fn attach_watch(self: &Rc<Self>, request: ShutdownRequest, kinds: &'static [EventKind]) {
        let slot: RequestSlot = Rc::new(RefCell::new(Some(request)));
        let weak = self.this.clone();
        let armed = Rc::clone(&slot);
        let listener = Listener::new(move |_| {
            let taken = armed.borrow_mut().take();
            let (Some(request), Some(inner)) = (taken, weak.upgrade()) else {
                return;
            };
            inner.shutdown(request);
        });
        self.state.borrow_mut().watch = Some(ShutdownWatch {
            listener: listener.clone(),
            kinds,
            slot,
        });
        for kind in kinds {
            self.connection.on(*kind, &listener);
        }
    }

    fn complete_shutdown(self: &Rc<Self>, completion: Completion, result: Result<(), StreamError>) {
        match completion {
            Completion::End => {
                // 销毁已接管收尾，由销毁自己的关闭尝试发出 `Close`。
                if self.state.borrow().intent == Intent::Destroyed {
                    trace!(target: TARGET, "graceful completion superseded by destroy");
                    return;
                }
                match result {
                    Ok(()) => {
                        let callbacks = self.state.borrow_mut().writable.finish();
                        debug!(target: TARGET, "write side finished");
                        self.emit(StreamEvent::Finish);
                        for callback in callbacks {
                            callback(Ok(()));
                        }
                    }
                    Err(error) => {
                        warn!(target: TARGET, error = %error, "graceful shutdown failed");
                        let callbacks = self.state.borrow_mut().writable.take_end_callbacks();
                        for callback in callbacks {
                            callback(Err(error.clone()));
                        }
                        self.fail_terminal(error);
                    }
                }
            }
            Completion::Destroy(error) => {
                if let Err(failure) = result {
                    warn!(target: TARGET, error = %failure, "shutdown after destroy failed");
                }
                if let Some(error) = error {
                    self.fail_terminal(error);
                }
            }
        }
        self.teardown_lifetime();
        self.emit_close_once();
    }

    /// 终止错误既派发给观察者，也留给拉模式消费者读取一次。
    fn fail_terminal(&self, error: StreamError) {
        self.state.borrow_mut().readable.set_error(error.clone());
        self.emit(StreamEvent::Error(error));
    }
}
