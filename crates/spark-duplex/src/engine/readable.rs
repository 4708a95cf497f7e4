//! 读侧：缓冲、流动模式与 `futures::Stream` 集成。
//!
//! # 教案级注释
//! - **Why**：下游消费者需要背压手段，暂停期间引擎不能继续派发值；
//! - **How**：三种流动模式。初始为隐式暂停，首次订阅观察者切换为流动；`pause`/`resume` 显式切换。
//!   非流动模式下的值按到达顺序进入缓冲，可由 `read()` 或 `Stream::poll_next` 拉取；
//! - **What**：缓冲超过高水位只记录一次告警，值永不丢弃；终止错误只向拉模式消费者交付一次，
//!   之后流以 `None` 结束。

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use futures::Stream;
use tracing::{trace, warn};

use super::events::Observer;
use super::{DuplexStream, Inner, ObserverId, StreamEvent, TARGET};
use crate::codec::Codec;
use crate::error::StreamError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    /// 尚未有人表达消费意图。
    Implicit,
    Flowing,
    /// 消费者显式暂停。
    Paused,
}

/// 读侧状态。
pub(super) struct Readable<T> {
    buffer: VecDeque<T>,
    flow: Flow,
    ended: bool,
    terminal_error: Option<StreamError>,
    waker: Option<Waker>,
    over_high_water: bool,
}

impl<T> Readable<T> {
    pub(super) fn new(start_paused: bool) -> Self {
        Self {
            buffer: VecDeque::new(),
            flow: if start_paused {
                Flow::Paused
            } else {
                Flow::Implicit
            },
            ended: false,
            terminal_error: None,
            waker: None,
            over_high_water: false,
        }
    }

    pub(super) fn is_paused(&self) -> bool {
        self.flow != Flow::Flowing
    }

    pub(super) fn len(&self) -> usize {
        self.buffer.len()
    }

    /// 终止：不再有新值，唤醒等待中的拉模式消费者。
    pub(super) fn end(&mut self) {
        self.ended = true;
        self.wake();
    }

    pub(super) fn set_error(&mut self, error: StreamError) {
        self.terminal_error = Some(error);
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    fn pop(&mut self, high_water_mark: usize) -> Option<T> {
        let value = self.buffer.pop_front()?;
        if self.buffer.len() <= high_water_mark {
            self.over_high_water = false;
        }
        Some(value)
    }
}

impl<C: Codec> Inner<C> {
    /// 把一个读到的值交给下游：流动且无积压时直接派发，否则进入缓冲。
    pub(super) fn push_readable(&self, value: C::Item) {
        let deliver = {
            let mut state = self.state.borrow_mut();
            let readable = &mut state.readable;
            if readable.flow == Flow::Flowing && readable.buffer.is_empty() {
                Some(value)
            } else {
                readable.buffer.push_back(value);
                let len = readable.buffer.len();
                let mark = self.config.readable_high_water_mark;
                if len > mark && !readable.over_high_water {
                    readable.over_high_water = true;
                    warn!(
                        target: TARGET,
                        buffered = len,
                        high_water_mark = mark,
                        "readable buffer above high-water mark; consumer is not keeping up"
                    );
                }
                readable.wake();
                None
            }
        };
        if let Some(value) = deliver {
            self.emit(StreamEvent::Data(value));
        }
    }

    pub(super) fn subscribe(&self, observer: Observer<C::Item>) -> ObserverId {
        let (id, start_flowing) = {
            let mut state = self.state.borrow_mut();
            let id = state.observers.insert(observer);
            let start = state.readable.flow == Flow::Implicit;
            if start {
                state.readable.flow = Flow::Flowing;
            }
            (id, start)
        };
        trace!(target: TARGET, observer = %id, "observer subscribed");
        if start_flowing {
            self.flush_readable();
        }
        id
    }

    pub(super) fn pause(&self) {
        self.state.borrow_mut().readable.flow = Flow::Paused;
        trace!(target: TARGET, "readable paused");
    }

    pub(super) fn resume(&self) {
        self.state.borrow_mut().readable.flow = Flow::Flowing;
        trace!(target: TARGET, "readable resumed");
        self.flush_readable();
    }

    pub(super) fn read(&self) -> Option<C::Item> {
        let mark = self.config.readable_high_water_mark;
        self.state.borrow_mut().readable.pop(mark)
    }

    /// 流动模式下逐个派发缓冲值，观察者在回调里暂停会立即生效。
    fn flush_readable(&self) {
        let mark = self.config.readable_high_water_mark;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.readable.flow != Flow::Flowing {
                    None
                } else {
                    state.readable.pop(mark)
                }
            };
            match next {
                Some(value) => self.emit(StreamEvent::Data(value)),
                None => break,
            }
        }
    }

    fn poll_readable(&self, cx: &mut Context<'_>) -> Poll<Option<Result<C::Item, StreamError>>> {
        let mark = self.config.readable_high_water_mark;
        let mut state = self.state.borrow_mut();
        let readable = &mut state.readable;
        if let Some(value) = readable.pop(mark) {
            return Poll::Ready(Some(Ok(value)));
        }
        if let Some(error) = readable.terminal_error.take() {
            return Poll::Ready(Some(Err(error)));
        }
        if readable.ended {
            return Poll::Ready(None);
        }
        readable.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// 拉模式消费：先交付缓冲值，再交付一次终止错误（如有），终止后结束。
impl<C: Codec> Stream for DuplexStream<C> {
    type Item = Result<C::Item, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_readable(cx)
    }
}
