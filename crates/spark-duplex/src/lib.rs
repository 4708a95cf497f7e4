#![warn(missing_docs)]

//! # spark-duplex
//!
//! ## 使命概述（Why）
//! - 将三种结构迥异的实时连接（原生 WebSocket、SockJS 服务端连接、Socket.IO socket）统一为
//!   **一条双工的结构化值流**：写入值即发送一帧，收到一帧即读出一个值；
//! - 把“连接生命周期（CONNECTING → OPEN → CLOSING → CLOSED）”与“流的结束/销毁”对齐，
//!   保证 `Close` 事件恰好一次、监听器不泄漏、关闭码与原因可预期。
//!
//! ## 分层结构（How）
//! - [`endpoint`]：外部连接对象的“鸭子类型”形态描述，分类器只看成员集合；
//! - [`classify`]：按结构签名选择适配器，或信任调用方给出的提示；
//! - [`adapter`]：每个传输家族一个能力适配器，统一为 [`connection::Connection`] 契约；
//! - [`codec`]：值与文本帧之间的可插拔编解码，默认 JSON；
//! - [`engine`]：[`DuplexStream`] 状态机，负责读写路径、待发队列与关闭时序。
//!
//! ## 执行模型（What）
//! - 单线程协作式：句柄基于 `Rc`/`RefCell`，不是 `Send`；
//! - 唯一的“下一拍”延迟通过注入的 [`futures::task::LocalSpawn`] 完成；
//! - 所有回调均不会在持有内部借用时调用，允许监听器重入引擎 API。
//!
//! ## 示例
//! ```ignore
//! use futures::executor::LocalPool;
//! use spark_duplex::{DuplexConfig, DuplexStream, JsonCodec};
//!
//! let mut pool = LocalPool::new();
//! let stream = DuplexStream::from_endpoint(socket, JsonCodec::default(), pool.spawner(), DuplexConfig::default())?;
//! stream.write(serde_json::json!({"hello": "world"}));
//! stream.end();
//! pool.run_until_stalled();
//! ```

pub mod adapter;
pub mod classify;
pub mod close;
pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod status;

pub use adapter::{AdaptedConnection, EmitterAdapter, PollingAdapter, RawSocketAdapter};
pub use classify::{TransportFamily, TransportHint, classify};
pub use close::CloseFrame;
pub use codec::{Codec, JsonCodec, TextCodec};
pub use config::{ConfigError, DuplexConfig, DuplexConfigBuilder};
pub use connection::{Connection, ConnectionEvent, EventKind, Listener, SendCallback};
pub use endpoint::{Endpoint, EndpointError, Member, MemberSet, NativeEvent, NativeListener};
pub use engine::{Ack, DuplexStream, ObserverId, StreamEvent};
pub use error::{CodecError, CodecErrorKind, StreamError};
pub use status::ConnectionStatus;
