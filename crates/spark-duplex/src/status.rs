//! 连接状态的统一枚举。
//!
//! # 教案级说明
//! - **Why**：三类传输各有原生状态模型（`readyState` 数字、布尔 `connected`），引擎只认一种；
//! - **What**：四个合法取值 + `Unknown`，后者只用于暴露适配器缺陷，引擎遇到时按“意外状态”失败；
//! - **Trade-offs**：事件发射器型传输只有布尔标志，无法表达 CONNECTING/CLOSING，
//!   其适配器会把 `true → Open`、`false → Closed` 直接折叠。

use core::fmt;

/// 适配后连接所处的生命周期阶段。
///
/// 状态单调推进：一旦进入 `Closing`，不会再回到 `Connecting`/`Open`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// 握手尚未完成，写入需要排队。
    Connecting,
    /// 可以直接发送。
    Open,
    /// 关闭握手进行中，等待 `close` 事件。
    Closing,
    /// 连接已经关闭。
    Closed,
    /// 适配器报告了四值枚举之外的原生状态，携带原始数值便于排障。
    Unknown(u16),
}

impl ConnectionStatus {
    /// WebSocket 风格 `readyState` 的原生取值。
    pub const CONNECTING: u16 = 0;
    /// 见 [`Self::CONNECTING`]。
    pub const OPEN: u16 = 1;
    /// 见 [`Self::CONNECTING`]。
    pub const CLOSING: u16 = 2;
    /// 见 [`Self::CONNECTING`]。
    pub const CLOSED: u16 = 3;

    /// 将 `readyState` 数值映射为统一状态，超出范围时返回 [`ConnectionStatus::Unknown`]。
    pub fn from_ready_state(raw: u16) -> Self {
        match raw {
            Self::CONNECTING => Self::Connecting,
            Self::OPEN => Self::Open,
            Self::CLOSING => Self::Closing,
            Self::CLOSED => Self::Closed,
            other => Self::Unknown(other),
        }
    }

    /// 将布尔 `connected` 标志折叠为统一状态。
    ///
    /// 事件发射器型传输只会在握手完成后交给应用层，因此不存在可观测的 CONNECTING；
    /// 断开过程也没有中间态，`false` 直接视为 `Closed`。
    pub fn from_connected(connected: bool) -> Self {
        if connected { Self::Open } else { Self::Closed }
    }

    /// 对应的原生 `readyState` 数值。
    pub fn ready_state(self) -> u16 {
        match self {
            Self::Connecting => Self::CONNECTING,
            Self::Open => Self::OPEN,
            Self::Closing => Self::CLOSING,
            Self::Closed => Self::CLOSED,
            Self::Unknown(raw) => raw,
        }
    }

    /// 是否已经进入关闭阶段（`Closing` 或 `Closed`）。
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("CONNECTING"),
            Self::Open => f.write_str("OPEN"),
            Self::Closing => f.write_str("CLOSING"),
            Self::Closed => f.write_str("CLOSED"),
            Self::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_maps_four_values_and_flags_the_rest() {
        assert_eq!(ConnectionStatus::from_ready_state(0), ConnectionStatus::Connecting);
        assert_eq!(ConnectionStatus::from_ready_state(1), ConnectionStatus::Open);
        assert_eq!(ConnectionStatus::from_ready_state(2), ConnectionStatus::Closing);
        assert_eq!(ConnectionStatus::from_ready_state(3), ConnectionStatus::Closed);
        assert_eq!(ConnectionStatus::from_ready_state(7), ConnectionStatus::Unknown(7));
        assert_eq!(ConnectionStatus::Unknown(7).ready_state(), 7);
    }

    #[test]
    fn connected_flag_collapses_to_open_or_closed() {
        assert_eq!(ConnectionStatus::from_connected(true), ConnectionStatus::Open);
        assert_eq!(ConnectionStatus::from_connected(false), ConnectionStatus::Closed);
        assert!(ConnectionStatus::from_connected(false).is_closing_or_closed());
    }
}
