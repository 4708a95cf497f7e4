//! 写侧框架：串行化写入、结束写侧与完成凭据。
//!
//! # 教案级注释
//! - **Why**：连续写入必须按提交顺序到达连接，且同一时刻只允许一个写入处于在途状态，
//!   否则 CONNECTING 期间的待发队列与 OPEN 后的直发会交错；
//! - **How**：`drive_writes` 是唯一的出队点，用 `driving` 标志挡住同步完成回调引起的重入，
//!   由最外层循环继续出队；缓冲排空且已请求结束时，启动最终关闭；
//! - **What**：每个写入的回调恰好调用一次；失败同时以 `Error` 事件通知（流尚未销毁或关闭时），但不会终止流。

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::{debug, trace};

use super::shutdown::{Completion, ShutdownRequest};
use super::{Inner, Intent, StreamEvent, TARGET};
use crate::close::CloseFrame;
use crate::codec::Codec;
use crate::connection::SendCallback;
use crate::error::StreamError;

/// 一次尚未派发的写入。
pub(super) struct WriteRequest<T> {
    value: T,
    callback: Option<SendCallback>,
}

impl<T> WriteRequest<T> {
    pub(super) fn fail(self, error: StreamError) {
        if let Some(callback) = self.callback {
            callback(Err(error));
        }
    }
}

/// 写侧状态。
pub(super) struct Writable<T> {
    buffered: VecDeque<WriteRequest<T>>,
    in_flight: bool,
    driving: bool,
    ending: bool,
    final_started: bool,
    pub(super) finished: bool,
    end_callbacks: Vec<SendCallback>,
}

impl<T> Default for Writable<T> {
    fn default() -> Self {
        Self {
            buffered: VecDeque::new(),
            in_flight: false,
            driving: false,
            ending: false,
            final_started: false,
            finished: false,
            end_callbacks: Vec::new(),
        }
    }
}

impl<T> Writable<T> {
    /// 销毁时取走所有尚未完成的写入与结束回调，并阻止最终关闭再被启动。
    pub(super) fn abandon(&mut self) -> (Vec<WriteRequest<T>>, Vec<SendCallback>) {
        self.ending = true;
        self.final_started = true;
        (
            self.buffered.drain(..).collect(),
            std::mem::take(&mut self.end_callbacks),
        )
    }

    /// 最终关闭成功：标记写侧完成并交出结束回调。
    pub(super) fn finish(&mut self) -> Vec<SendCallback> {
        self.finished = true;
        std::mem::take(&mut self.end_callbacks)
    }

    /// 最终关闭失败：交出结束回调。
    pub(super) fn take_end_callbacks(&mut self) -> Vec<SendCallback> {
        std::mem::take(&mut self.end_callbacks)
    }
}

enum Next<T> {
    Write(WriteRequest<T>),
    Final,
}

impl<C: Codec> Inner<C> {
    pub(super) fn write(self: &Rc<Self>, value: C::Item, callback: Option<SendCallback>) {
        let rejection = {
            let mut state = self.state.borrow_mut();
            if state.intent == Intent::Destroyed {
                Some((StreamError::Closed, callback))
            } else if state.writable.ending {
                Some((StreamError::WriteAfterEnd, callback))
            } else if state.close_emitted {
                Some((StreamError::Closed, callback))
            } else {
                state.writable.buffered.push_back(WriteRequest { value, callback });
                None
            }
        };
        match rejection {
            None => self.drive_writes(),
            Some((error, callback)) => {
                debug!(target: TARGET, error = error.code(), "write rejected");
                let surface = error == StreamError::WriteAfterEnd;
                self.defer(move |inner| {
                    if let Some(callback) = callback {
                        callback(Err(error.clone()));
                    }
                    if surface && !inner.state.borrow().close_emitted {
                        inner.emit(StreamEvent::Error(error));
                    }
                });
            }
        }
    }

    pub(super) fn end(self: &Rc<Self>, callback: Option<SendCallback>) {
        enum Outcome {
            Queued,
            AlreadyFinished(Option<SendCallback>),
            Terminated(Option<SendCallback>),
        }
        let outcome = {
            let mut state = self.state.borrow_mut();
            if state.writable.finished {
                Outcome::AlreadyFinished(callback)
            } else if state.intent == Intent::Destroyed || state.close_emitted {
                Outcome::Terminated(callback)
            } else {
                state.writable.ending = true;
                state.writable.end_callbacks.extend(callback);
                Outcome::Queued
            }
        };
        match outcome {
            Outcome::Queued => {
                trace!(target: TARGET, "end requested");
                self.drive_writes();
            }
            Outcome::AlreadyFinished(callback) => {
                if let Some(callback) = callback {
                    self.defer(move |_| callback(Ok(())));
                }
            }
            Outcome::Terminated(callback) => {
                if let Some(callback) = callback {
                    self.defer(move |_| callback(Err(StreamError::Closed)));
                }
            }
        }
    }

    /// 写侧唯一的出队点。
    fn drive_writes(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.writable.driving {
                return;
            }
            state.writable.driving = true;
        }
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let destroyed = state.intent == Intent::Destroyed;
                let writable = &mut state.writable;
                if destroyed || writable.in_flight {
                    None
                } else if let Some(request) = writable.buffered.pop_front() {
                    writable.in_flight = true;
                    Some(Next::Write(request))
                } else if writable.ending && !writable.final_started {
                    writable.final_started = true;
                    Some(Next::Final)
                } else {
                    None
                }
            };
            match next {
                Some(Next::Write(request)) => self.dispatch_write(request),
                Some(Next::Final) => self.run_final(),
                None => break,
            }
        }
        self.state.borrow_mut().writable.driving = false;
    }

    fn dispatch_write(self: &Rc<Self>, request: WriteRequest<C::Item>) {
        let WriteRequest { value, callback } = request;
        match self.codec.serialize(&value) {
            Err(source) => {
                self.on_write_complete(callback, Err(StreamError::Serialization { source }));
            }
            Ok(payload) => {
                let weak = self.this.clone();
                self.transmit(
                    payload,
                    Box::new(move |result| match weak.upgrade() {
                        Some(inner) => inner.on_write_complete(callback, result),
                        None => {
                            if let Some(callback) = callback {
                                callback(result);
                            }
                        }
                    }),
                );
            }
        }
    }

    fn on_write_complete(
        self: &Rc<Self>,
        callback: Option<SendCallback>,
        result: Result<(), StreamError>,
    ) {
        let terminated = {
            let mut state = self.state.borrow_mut();
            state.writable.in_flight = false;
            state.intent == Intent::Destroyed || state.close_emitted
        };
        if let Err(error) = &result {
            debug!(target: TARGET, error = error.code(), "write failed");
        }
        let surfaced = match (&result, terminated) {
            (Err(error), false) => Some(error.clone()),
            _ => None,
        };
        if let Some(callback) = callback {
            callback(result);
        }
        if let Some(error) = surfaced {
            self.emit(StreamEvent::Error(error));
        }
        self.drive_writes();
    }

    /// 缓冲排空后的最终关闭：1000 / "stream end"。
    fn run_final(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.intent == Intent::Active {
                state.intent = Intent::Ending;
            }
        }
        debug!(target: TARGET, "writes drained; closing with stream end");
        self.shutdown(ShutdownRequest {
            frame: CloseFrame::stream_end(),
            completion: Completion::End,
        });
    }
}

/// 写入或结束的完成凭据。
///
/// 引擎在回调前被析构时解析为 [`StreamError::Closed`]。
#[derive(Debug)]
#[must_use = "Ack 不轮询就无法观察写入结果"]
pub struct Ack {
    receiver: oneshot::Receiver<Result<(), StreamError>>,
}

impl Ack {
    pub(super) fn channel() -> (Self, SendCallback) {
        let (sender, receiver) = oneshot::channel();
        let callback: SendCallback = Box::new(move |result| {
            // 接收端已丢弃时无人关心结果。
            let _ = sender.send(result);
        });
        (Self { receiver }, callback)
    }
}

impl Future for Ack {
    type Output = Result<(), StreamError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(StreamError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
