//! CONNECTING 期间的待发队列。
//!
//! # 教案级注释
//! - **Why**：客户端 socket 在握手完成前不能发送，但应用可能已经开始写入；
//! - **How**：队列在第一次排队时惰性创建，并只挂接一个同时订阅 `open` 与 `close` 的监听器；
//!   监听器触发时先摘下自己，再按 FIFO 把每个条目重新走一遍状态分派
//!   （此时状态已是 OPEN 或 CLOSED，条目要么发出，要么以 [`StreamError::Closed`] 失败）；
//! - **What**：每个引擎至多一个队列；排空后即丢弃，下一次排队会重新创建。

use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{Inner, TARGET};
use crate::codec::Codec;
use crate::connection::{EventKind, Listener, SendCallback};
use crate::error::StreamError;
use crate::status::ConnectionStatus;

/// 队列监听的事件。
const WATCHED: [EventKind; 2] = [EventKind::Open, EventKind::Close];

/// 一条待发写入：已序列化的帧与其完成回调。
struct PendingEntry {
    payload: String,
    callback: SendCallback,
}

/// 待发队列及其唯一的监听器。
pub(super) struct PendingQueue {
    entries: VecDeque<PendingEntry>,
    listener: Listener,
}

impl PendingQueue {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn listener(&self) -> &Listener {
        &self.listener
    }

    /// 以 [`StreamError::Closed`] 失败全部条目。
    pub(super) fn fail_all(self) {
        for entry in self.entries {
            (entry.callback)(Err(StreamError::Closed));
        }
    }
}

impl<C: Codec> Inner<C> {
    /// 按连接状态分派一帧。
    pub(super) fn transmit(self: &Rc<Self>, payload: String, callback: SendCallback) {
        match self.connection.status() {
            ConnectionStatus::Open => self.connection.send(payload, callback),
            ConnectionStatus::Connecting => self.enqueue_pending(payload, callback),
            ConnectionStatus::Closing | ConnectionStatus::Closed => {
                callback(Err(StreamError::Closed))
            }
            ConnectionStatus::Unknown(status) => {
                callback(Err(StreamError::UnexpectedStatus { status }))
            }
        }
    }

    fn enqueue_pending(self: &Rc<Self>, payload: String, callback: SendCallback) {
        let entry = PendingEntry { payload, callback };
        let attach = {
            let mut state = self.state.borrow_mut();
            match state.pending.as_mut() {
                Some(queue) => {
                    queue.entries.push_back(entry);
                    None
                }
                None => {
                    let weak = self.this.clone();
                    let listener = Listener::new(move |_| {
                        if let Some(inner) = weak.upgrade() {
                            inner.drain_pending();
                        }
                    });
                    state.pending = Some(PendingQueue {
                        entries: VecDeque::from([entry]),
                        listener: listener.clone(),
                    });
                    Some(listener)
                }
            }
        };
        match attach {
            Some(listener) => {
                for kind in WATCHED {
                    self.connection.on(kind, &listener);
                }
                debug!(target: TARGET, "pending queue created; waiting for open");
            }
            None => trace!(target: TARGET, "write appended to pending queue"),
        }
    }

    /// 握手结束（成功或失败）：摘下监听器并按序重发。
    fn drain_pending(self: &Rc<Self>) {
        let Some(queue) = self.state.borrow_mut().pending.take() else {
            return;
        };
        for kind in WATCHED {
            self.connection.off(kind, &queue.listener);
        }
        debug!(
            target: TARGET,
            entries = queue.entries.len(),
            status = %self.connection.status(),
            "draining pending queue"
        );
        for entry in queue.entries {
            self.transmit(entry.payload, entry.callback);
        }
    }

    /// 销毁路径：摘下监听器并失败全部条目。
    pub(super) fn fail_pending(&self, queue: PendingQueue) {
        for kind in WATCHED {
            self.connection.off(kind, &queue.listener);
        }
        debug!(target: TARGET, entries = queue.len(), "failing pending writes");
        queue.fail_all();
    }
}
