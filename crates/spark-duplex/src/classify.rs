//! 传输分类器：按结构签名挑选适配器。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 三类连接对象由不同作者实现，没有共同基类，只能依据“具备哪些成员、缺少哪些成员”识别；
//! - 调用方确知类型时可以给出显式提示，完全跳过探测，避免误判。
//!
//! ## 逻辑（How）
//! - 每个家族有一个 [`Signature`]：必需成员 + 禁止成员；
//! - 自动模式按固定顺序（原生 socket → SockJS → Socket.IO）逐个比对，第一个命中者胜出；
//! - 签名两两互斥：`send` 在原生 socket 中必需，在另外两者中被禁止；`readyState` 在 SockJS 中必需，
//!   在 Socket.IO 中被禁止。因此探测顺序不会影响结果，只影响失败时的日志顺序。
//!
//! ## 契约（What）
//! - 无匹配 → [`StreamError::UnsupportedShape`]，携带探测到的成员列表；
//! - 提示字符串无法识别 → [`StreamError::UnknownAdapterType`]。

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::AdaptedConnection;
use crate::endpoint::{Endpoint, Member, MemberSet};
use crate::error::StreamError;

/// 三个互斥的传输家族。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportFamily {
    /// 原生 WebSocket 形态。
    RawSocket,
    /// SockJS 服务端连接形态（带 `write` 的事件发射器）。
    PollingFallback,
    /// Socket.IO socket 形态（带 `connected` 标志的事件发射器）。
    EventEmitter,
}

impl TransportFamily {
    /// 自动探测时的比对顺序。
    pub const PROBE_ORDER: [TransportFamily; 3] = [
        TransportFamily::RawSocket,
        TransportFamily::PollingFallback,
        TransportFamily::EventEmitter,
    ];

    /// 规范名称，与 [`TransportHint`] 的字符串形式一致。
    pub fn name(self) -> &'static str {
        match self {
            TransportFamily::RawSocket => "websocket",
            TransportFamily::PollingFallback => "sockjs",
            TransportFamily::EventEmitter => "socket.io",
        }
    }

    /// 家族的结构签名。
    pub fn signature(self) -> Signature {
        match self {
            TransportFamily::RawSocket => Signature {
                required: &[
                    Member::ReadyState,
                    Member::Send,
                    Member::AddEventListener,
                    Member::RemoveEventListener,
                ],
                forbidden: &[],
            },
            TransportFamily::PollingFallback => Signature {
                required: &[Member::ReadyState, Member::Write, Member::On, Member::Off],
                forbidden: &[Member::Send],
            },
            TransportFamily::EventEmitter => Signature {
                required: &[
                    Member::Id,
                    Member::Connected,
                    Member::Emit,
                    Member::On,
                    Member::Off,
                    Member::Disconnect,
                ],
                forbidden: &[Member::ReadyState, Member::Send],
            },
        }
    }

    /// 在自动模式下识别成员集合所属的家族。
    pub fn detect(members: &MemberSet) -> Option<Self> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|family| family.signature().matches(members))
    }
}

impl fmt::Display for TransportFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 结构签名：必须具备的成员与必须缺少的成员。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// 必需成员。
    pub required: &'static [Member],
    /// 禁止成员，用于保证签名互斥。
    pub forbidden: &'static [Member],
}

impl Signature {
    /// 成员集合是否满足该签名。
    pub fn matches(&self, members: &MemberSet) -> bool {
        members.contains_all(self.required) && !members.contains_any(self.forbidden)
    }
}

/// 调用方给出的分类提示。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransportHint {
    /// 结构探测。
    #[default]
    Auto,
    /// 信任调用方，直接使用该家族的适配器。
    Explicit(TransportFamily),
}

impl FromStr for TransportHint {
    type Err = StreamError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let hint = match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => TransportHint::Auto,
            "websocket" | "ws" => TransportHint::Explicit(TransportFamily::RawSocket),
            "sockjs" => TransportHint::Explicit(TransportFamily::PollingFallback),
            "socket.io" | "socketio" => TransportHint::Explicit(TransportFamily::EventEmitter),
            _ => {
                return Err(StreamError::UnknownAdapterType {
                    hint: raw.to_owned(),
                });
            }
        };
        Ok(hint)
    }
}

impl TryFrom<String> for TransportHint {
    type Error = StreamError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<TransportHint> for String {
    fn from(hint: TransportHint) -> Self {
        hint.to_string()
    }
}

impl From<TransportFamily> for TransportHint {
    fn from(family: TransportFamily) -> Self {
        TransportHint::Explicit(family)
    }
}

impl fmt::Display for TransportHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportHint::Auto => f.write_str("auto"),
            TransportHint::Explicit(family) => f.write_str(family.name()),
        }
    }
}

/// 为连接对象挑选并构造适配器。
///
/// 显式提示不做形态校验；自动模式只查看 [`Endpoint::members`]。
pub fn classify(
    endpoint: Rc<dyn Endpoint>,
    hint: TransportHint,
) -> Result<AdaptedConnection, StreamError> {
    let family = match hint {
        TransportHint::Explicit(family) => {
            debug!(target: "spark_duplex::classify", family = family.name(), "using explicit transport hint");
            family
        }
        TransportHint::Auto => {
            let members = endpoint.members();
            match TransportFamily::detect(&members) {
                Some(family) => {
                    debug!(target: "spark_duplex::classify", family = family.name(), "transport detected");
                    family
                }
                None => {
                    debug!(target: "spark_duplex::classify", members = %members, "no transport signature matched");
                    return Err(StreamError::UnsupportedShape {
                        members: members.to_string(),
                    });
                }
            }
        }
    };
    Ok(AdaptedConnection::adapt(family, endpoint))
}
