//! 外部连接对象的原生形态。
//!
//! # 教案级说明
//! - **Why**：三类传输（原生 socket、SockJS 长轮询回退、Socket.IO）由不同作者实现，没有共同基类。
//!   分类器必须靠“具备哪些成员”来识别，而不是运行期类型身份；
//! - **What**：[`Endpoint`] 的每个方法对应形态中的一个成员，默认实现返回
//!   [`EndpointError::MissingMember`]；实现者只覆写自己真正具备的成员，并在 [`Endpoint::members`]
//!   中如实声明；
//! - **How**：原生事件统一为 [`NativeEvent`]，监听器为可比较身份的 [`NativeListener`]；
//! - **Trade-offs**：成员声明与方法实现需要由实现者保持一致；声明了却未实现的成员会在调用时
//!   以 `MissingMember` 暴露出来。

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// 连接形态中的一个成员（字段或方法）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Member {
    /// 数值状态字段 `readyState`。
    ReadyState,
    /// 带确认回调的 `send`。
    Send,
    /// 流式 `write`。
    Write,
    /// `close(code, reason)`。
    Close,
    /// DOM 风格订阅。
    AddEventListener,
    /// DOM 风格退订。
    RemoveEventListener,
    /// 发射器风格订阅。
    On,
    /// 发射器风格退订。
    Off,
    /// 身份字段 `id`。
    Id,
    /// 布尔字段 `connected`。
    Connected,
    /// 发射器 `emit`。
    Emit,
    /// `disconnect(close)`。
    Disconnect,
}

impl Member {
    /// 成员在原生形态中的名字。
    pub fn as_str(self) -> &'static str {
        match self {
            Member::ReadyState => "readyState",
            Member::Send => "send",
            Member::Write => "write",
            Member::Close => "close",
            Member::AddEventListener => "addEventListener",
            Member::RemoveEventListener => "removeEventListener",
            Member::On => "on",
            Member::Off => "off",
            Member::Id => "id",
            Member::Connected => "connected",
            Member::Emit => "emit",
            Member::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个连接对象声明的成员集合。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberSet(BTreeSet<Member>);

impl MemberSet {
    /// 空集合。
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式追加成员。
    pub fn with(mut self, member: Member) -> Self {
        self.0.insert(member);
        self
    }

    /// 追加成员。
    pub fn insert(&mut self, member: Member) {
        self.0.insert(member);
    }

    /// 是否包含成员。
    pub fn contains(&self, member: Member) -> bool {
        self.0.contains(&member)
    }

    /// 是否包含全部成员。
    pub fn contains_all(&self, members: &[Member]) -> bool {
        members.iter().all(|m| self.contains(*m))
    }

    /// 是否包含任一成员。
    pub fn contains_any(&self, members: &[Member]) -> bool {
        members.iter().any(|m| self.contains(*m))
    }

    /// 按成员声明顺序遍历。
    pub fn iter(&self) -> impl Iterator<Item = Member> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Member> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Member>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for member in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(member.as_str())?;
        }
        Ok(())
    }
}

/// 原生连接派发的事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeEvent {
    /// 原生 socket 的 `message` 事件，或 Socket.IO 的 `message` 负载。
    Message {
        /// 文本帧内容。
        data: String,
    },
    /// SockJS 的 `data` 事件。
    Data(String),
    /// 握手完成。
    Open,
    /// 原生 socket / SockJS 的 `close` 事件。
    Close {
        /// 对端或本地给出的关闭码。
        code: Option<u16>,
        /// 关闭原因。
        reason: String,
    },
    /// Socket.IO 的 `disconnect` 事件。
    Disconnect {
        /// 断开原因，例如 `"server namespace disconnect"`。
        reason: String,
    },
}

/// 注册到原生连接上的监听器。
///
/// 身份按内部 `Rc` 的数据指针比较：克隆得到的句柄与原句柄相等，独立创建的闭包互不相等。
#[derive(Clone)]
pub struct NativeListener(Rc<dyn Fn(&NativeEvent)>);

impl NativeListener {
    /// 包装一个闭包。
    pub fn new(f: impl Fn(&NativeEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// 派发事件。
    pub fn call(&self, event: &NativeEvent) {
        (self.0)(event)
    }
}

impl PartialEq for NativeListener {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl Eq for NativeListener {}

impl fmt::Debug for NativeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeListener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// 原生确认回调。
pub type SendAck = Box<dyn FnOnce(Result<(), EndpointError>)>;

/// 原生连接拒绝操作时的错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// 形态中没有该成员。
    #[error("connection has no `{0}` member")]
    MissingMember(Member),
    /// 原生实现拒绝了操作。
    #[error("{0}")]
    Rejected(String),
}

/// 外部连接对象的鸭子类型形态。
///
/// 每个方法对应一个 [`Member`]；未覆写的方法表示“没有这个成员”。
pub trait Endpoint {
    /// 声明该对象具备的成员，供分类器做结构探测。
    fn members(&self) -> MemberSet;

    /// `readyState` 字段。
    fn ready_state(&self) -> Option<u16> {
        None
    }

    /// `id` 字段。
    fn id(&self) -> Option<String> {
        None
    }

    /// `connected` 字段。
    fn connected(&self) -> Option<bool> {
        None
    }

    /// `send(data, ack)`；`ack` 恰好调用一次。
    fn send(&self, payload: &str, ack: SendAck) {
        let _ = payload;
        ack(Err(EndpointError::MissingMember(Member::Send)));
    }

    /// `write(data)`；返回值表示是否低于原生缓冲水位。
    fn write(&self, payload: &str) -> Result<bool, EndpointError> {
        let _ = payload;
        Err(EndpointError::MissingMember(Member::Write))
    }

    /// `emit(event, data)`。
    fn emit(&self, event: &str, payload: &str) -> Result<(), EndpointError> {
        let _ = (event, payload);
        Err(EndpointError::MissingMember(Member::Emit))
    }

    /// `close(code, reason)`；完成后异步派发 `close` 事件。
    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), EndpointError> {
        let _ = (code, reason);
        Err(EndpointError::MissingMember(Member::Close))
    }

    /// `disconnect(close)`。
    fn disconnect(&self, close: bool) -> Result<(), EndpointError> {
        let _ = close;
        Err(EndpointError::MissingMember(Member::Disconnect))
    }

    /// `addEventListener(event, listener)`。
    fn add_event_listener(
        &self,
        event: &str,
        listener: NativeListener,
    ) -> Result<(), EndpointError> {
        let _ = (event, listener);
        Err(EndpointError::MissingMember(Member::AddEventListener))
    }

    /// `removeEventListener(event, listener)`。
    fn remove_event_listener(
        &self,
        event: &str,
        listener: &NativeListener,
    ) -> Result<(), EndpointError> {
        let _ = (event, listener);
        Err(EndpointError::MissingMember(Member::RemoveEventListener))
    }

    /// `on(event, listener)`。
    fn on(&self, event: &str, listener: NativeListener) -> Result<(), EndpointError> {
        let _ = (event, listener);
        Err(EndpointError::MissingMember(Member::On))
    }

    /// `off(event, listener)`。
    fn off(&self, event: &str, listener: &NativeListener) -> Result<(), EndpointError> {
        let _ = (event, listener);
        Err(EndpointError::MissingMember(Member::Off))
    }
}
