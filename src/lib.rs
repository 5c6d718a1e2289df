//! # workers-chat - 流式聊天客户端核心
//!
//! 面向 Cloudflare Workers AI 的流式聊天客户端：把用户问题连同完整历史发送给推理端点，
//! 边接收 `data: ` 行边把增量文本追加到对话记录中，并允许随时取消正在进行的生成。
//!
//! ## 模块
//!
//! - [`transcript`]：对话历史与展示用问答对，纯数据。
//! - [`stream`]：把响应字节流按行解码为 [`Fragment`]。
//! - [`client`]：发起流式 HTTP 请求的 [`StreamClient`]。
//! - [`controller`]：回合状态机 [`ChatController`]，负责折叠片段与取消。
//!
//! 展示层只通过 [`ChatController`] 的方法修改状态，通过快照或订阅读取状态。
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use workers_chat::{ChatController, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // 从环境变量加载配置 (需要设置 ID 和 API_TOKEN)
//!     let config = Config::from_env()?;
//!     let chat = ChatController::from_config(config);
//!
//!     let outcome = chat.start("2+2?")?.run().await;
//!     println!("{:?}: {}", outcome, chat.snapshot().entries[0].answer);
//!
//!     Ok(())
//! }
//! ```

// 模块定义
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod stream;
pub mod transcript;
pub mod types;
pub mod utils;

pub use client::{FragmentSource, StreamClient};
pub use config::Config;
pub use controller::{ChatController, Turn};
pub use error::{ChatError, FetchFailure, Result};
pub use stream::{FragmentDecoder, FragmentStream};
pub use transcript::TranscriptStore;
pub use types::{ChatSnapshot, Fragment, Message, Phase, Role, TranscriptEntry, TurnOutcome};
pub use utils::message;
