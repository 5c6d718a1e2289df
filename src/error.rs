//! 错误处理模块

use thiserror::Error;

/// workers-chat 库的统一错误类型
///
/// 只有契约违规（`InvalidState`）和启动期错误会交给调用方；
/// 单轮对话中的网络/解码失败由控制器吸收，见 [`FetchFailure`]。
#[derive(Debug, Error)]
pub enum ChatError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 在不合法的阶段调用了操作
    #[error("状态无效: {0}")]
    InvalidState(String),

    /// 请求参数无效
    #[error("请求参数无效: {0}")]
    InvalidRequest(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// workers-chat 库的 Result 类型别名
pub type Result<T> = std::result::Result<T, ChatError>;

/// 单轮生成失败的原因
///
/// `Display` 的输出就是拼接在 `"Failed to fetch data: "` 之后显示给用户的文本。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// 上游返回了非 200 状态码
    #[error("{0}")]
    Status(u16),

    /// 连接失败，或在收到 `[DONE]` 之前连接中断
    #[error("{0}")]
    Transport(String),

    /// `data:` 行的内容不是合法的事件 JSON
    #[error("{0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_displays_bare_code() {
        assert_eq!(FetchFailure::Status(500).to_string(), "500");
    }

    #[test]
    fn io_error_converts_to_io_variant() {
        let err = std::io::Error::other("stdout closed");
        assert!(matches!(ChatError::from(err), ChatError::Io(_)));
    }
}
