//! 双工流的构造配置。
//!
//! # 教案级说明
//! - **Why**：传输提示、读侧水位、初始流动模式需要在部署时调整，而不是写死在调用点；
//! - **How**：[`DuplexConfig`] 实现 serde 双向转换，可从 TOML 片段解析，也可用 [`DuplexConfigBuilder`]
//!   链式构造；未知字段直接拒绝，避免拼写错误被静默忽略；
//! - **What**：缺省值为 `transport = "auto"`、`readable_high_water_mark = 16`、`start_paused = false`。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::TransportHint;

/// 读侧缓冲的默认告警水位。
pub const DEFAULT_READABLE_HIGH_WATER_MARK: usize = 16;

/// [`DuplexConfig::from_toml_str`] 的失败原因。
#[derive(Debug, Error)]
#[error("invalid duplex configuration: {0}")]
pub struct ConfigError(#[from] toml::de::Error);

/// 双工流配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuplexConfig {
    /// 分类提示，字符串形式：`auto`、`websocket`、`sockjs`、`socket.io`。
    pub transport: TransportHint,
    /// 读侧缓冲超过该长度时记录告警；值永远不会被丢弃。
    pub readable_high_water_mark: usize,
    /// 为 `true` 时以显式暂停模式启动，订阅观察者不会自动切换为流动模式。
    pub start_paused: bool,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            transport: TransportHint::Auto,
            readable_high_water_mark: DEFAULT_READABLE_HIGH_WATER_MARK,
            start_paused: false,
        }
    }
}

impl DuplexConfig {
    /// 从 TOML 文本解析，缺失字段取默认值。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// 构造器入口。
    pub fn builder() -> DuplexConfigBuilder {
        DuplexConfigBuilder::default()
    }
}

/// [`DuplexConfig`] 的链式构造器。
#[derive(Clone, Debug, Default)]
pub struct DuplexConfigBuilder {
    config: DuplexConfig,
}

impl DuplexConfigBuilder {
    /// 设置传输提示。
    pub fn transport(mut self, hint: impl Into<TransportHint>) -> Self {
        self.config.transport = hint.into();
        self
    }

    /// 设置读侧告警水位。
    pub fn readable_high_water_mark(mut self, mark: usize) -> Self {
        self.config.readable_high_water_mark = mark;
        self
    }

    /// 设置是否以暂停模式启动。
    pub fn start_paused(mut self, paused: bool) -> Self {
        self.config.start_paused = paused;
        self
    }

    /// 产出配置。
    pub fn build(self) -> DuplexConfig {
        self.config
    }
}
