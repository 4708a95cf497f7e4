//! 流的对外事件与观察者登记表。

use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;

/// 应用层可观测的流事件。
///
/// 顺序保证：同一引擎实例的 `Close` 恰好一次；经由 `end()` 终止时 `Finish` 一定先于 `Close`。
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent<T> {
    /// 读到一个值（仅在流动模式下派发）。
    Data(T),
    /// 单次操作失败，或销毁时携带的终止错误。
    Error(StreamError),
    /// 写侧已优雅结束。
    Finish,
    /// 终止事件。
    Close,
}

impl<T> StreamEvent<T> {
    /// 事件名，用于日志。
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Data(_) => "data",
            StreamEvent::Error(_) => "error",
            StreamEvent::Finish => "finish",
            StreamEvent::Close => "close",
        }
    }
}

/// [`super::DuplexStream::subscribe`] 返回的退订凭据。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

pub(super) type Observer<T> = Rc<dyn Fn(&StreamEvent<T>)>;

/// 观察者登记表。
///
/// `Close` 之后登记表被封存：已有观察者全部交出，新登记的观察者不再保留。
/// 观察者闭包常常捕获流句柄，封存才能打断“引擎 → 观察者 → 引擎”的引用环。
pub(super) struct Observers<T> {
    next_id: u64,
    sealed: bool,
    entries: Vec<(ObserverId, Observer<T>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            sealed: false,
            entries: Vec::new(),
        }
    }
}

impl<T> Observers<T> {
    pub(super) fn insert(&mut self, observer: Observer<T>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        if !self.sealed {
            self.entries.push((id, observer));
        }
        id
    }

    /// 封存登记表并交出全部观察者；调用方应在释放引擎借用后再析构它们。
    pub(super) fn seal(&mut self) -> Vec<Observer<T>> {
        self.sealed = true;
        self.entries.drain(..).map(|(_, f)| f).collect()
    }

    pub(super) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        before != self.entries.len()
    }

    /// 复制一份当前观察者列表，派发时不持有引擎借用，观察者可以重入引擎 API。
    pub(super) fn snapshot(&self) -> Vec<Observer<T>> {
        self.entries.iter().map(|(_, f)| Rc::clone(f)).collect()
    }
}
