//! 工具函数模块
use crate::types::{Message, Role};

/// 失败回合显示在回答位置的前缀
pub(crate) const FAILURE_PREFIX: &str = "Failed to fetch data: ";

/// 创建消息的便捷函数
///
/// # 参数
///
/// * `role` - 消息角色
/// * `content` - 消息内容
///
/// # 返回
///
/// 新创建的消息实例
pub fn message(role: Role, content: &str) -> Message {
    Message {
        role,
        content: content.to_string(),
    }
}

/// 拼接推理端点地址
///
/// 形如 `{api_base}/{account_id}/workers-ai/workers-ai/@cf/{model}`，
/// `api_base` 末尾多余的 `/` 会被去掉。
pub(crate) fn endpoint_url(api_base: &str, account_id: &str, model: &str) -> String {
    format!(
        "{}/{}/workers-ai/workers-ai/@cf/{}",
        api_base.trim_end_matches('/'),
        account_id,
        model
    )
}
