//! 数据结构模块

use crate::error::FetchFailure;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ================================================================================================
// 对话数据结构
// ================================================================================================

/// 对话消息
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// 角色
    pub role: Role,
    /// 内容
    pub content: String,
}

/// 角色枚举
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 系统
    System,
    /// 用户
    #[default]
    User,
    /// 机器人
    Assistant,
}

/// 显示用的问答对，每个用户回合一条
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptEntry {
    /// 用户问题
    pub question: String,
    /// 当前（或最终）回答
    pub answer: String,
}

// ================================================================================================
// API 请求结构
// ================================================================================================

/// 流式推理请求体
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// 完整的对话历史
    pub messages: &'a [Message],
    /// 总是 `true`
    pub stream: bool,
    /// 最大生成 token 数
    pub max_tokens: u32,
}

// ================================================================================================
// 流式 API 响应结构
// ================================================================================================

/// `data:` 行携带的事件
#[derive(Debug, Deserialize)]
pub struct StreamEvent {
    /// 本次增量文本
    pub response: String,
}

/// 从响应体中解码出的一个单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// 增量文本
    Token(String),
    /// 流正常结束
    Done,
    /// 本轮失败
    Error(FetchFailure),
}

// ================================================================================================
// 控制器状态
// ================================================================================================

/// 生成状态机的常驻阶段
///
/// `Finalized`/`Cancelled`/`Failed` 是瞬时状态，以 [`TurnOutcome`] 的形式报告后立即回到 `Idle`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Requesting,
    Streaming,
}

impl Phase {
    /// 是否有正在进行的回合
    pub fn is_busy(self) -> bool {
        !matches!(self, Phase::Idle)
    }
}

/// 一轮生成的终态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 收到 `Done`，回答已写入历史
    Finalized,
    /// 用户取消，部分文本保留在显示中
    Cancelled,
    /// 失败，错误文本显示在回答位置
    Failed(FetchFailure),
}

/// 提供给展示层的只读快照
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSnapshot {
    /// 全部问答对，未变化的条目在前后快照之间共享
    pub entries: Vec<Arc<TranscriptEntry>>,
    /// 当前阶段
    pub phase: Phase,
    /// 会话是否仍在生成（取消后立即变为 `false`）
    pub generating: bool,
    /// 下一轮使用的模型
    pub model: String,
    /// 上一轮的结果
    pub last_outcome: Option<TurnOutcome>,
}
