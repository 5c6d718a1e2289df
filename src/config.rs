//! 配置模块
use crate::error::{ChatError, Result};
use std::env;
use std::time::Duration;

// ===============================================================================================
// 默认值
// ===============================================================================================

/// 默认的系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a smart and versatile artificial intelligence \
    assistant. You will faithfully follow the user's instructions to solve and answer questions. \
    Your answers are detailed and professional, and they do not contain offensive information.";

/// 默认模型
pub const DEFAULT_MODEL: &str = "qwen/qwen1.5-14b-chat-awq";

/// 默认网关地址
pub const DEFAULT_API_BASE: &str = "https://gateway.ai.cloudflare.com/v1";

/// 可供展示层选择的文本生成模型
pub const KNOWN_MODELS: &[&str] = &[
    "meta/llama-2-7b-chat-fp16",
    "meta/llama-2-7b-chat-int8",
    "mistral/mistral-7b-instruct-v0.1",
    "thebloke/deepseek-coder-6.7b-base-awq",
    "thebloke/deepseek-coder-6.7b-instruct-awq",
    "deepseek-ai/deepseek-math-7b-base",
    "deepseek-ai/deepseek-math-7b-instruct",
    "thebloke/discolm-german-7b-v1-awq",
    "tiiuae/falcon-7b-instruct",
    "google/gemma-2b-it-lora",
    "google/gemma-7b-it",
    "google/gemma-7b-it-lora",
    "nousresearch/hermes-2-pro-mistral-7b",
    "thebloke/llama-2-13b-chat-awq",
    "meta-llama/llama-2-7b-chat-hf-lora",
    "thebloke/llamaguard-7b-awq",
    "thebloke/mistral-7b-instruct-v0.1-awq",
    "mistralai/mistral-7b-instruct-v0.2",
    "mistral/mistral-7b-instruct-v0.2-lora",
    "thebloke/neural-chat-7b-v3-1-awq",
    "openchat/openchat-3.5-0106",
    "thebloke/openhermes-2.5-mistral-7b-awq",
    "microsoft/phi-2",
    "qwen/qwen1.5-0.5b-chat",
    "qwen/qwen1.5-1.8b-chat",
    "qwen/qwen1.5-14b-chat-awq",
    "qwen/qwen1.5-7b-chat-awq",
    "defog/sqlcoder-7b-2",
    "nexusflow/starling-lm-7b-beta",
    "tinyllama/tinyllama-1.1b-chat-v1.0",
    "thebloke/zephyr-7b-beta-awq",
];

const ENV_ACCOUNT_ID: &str = "ID";
const ENV_API_TOKEN: &str = "API_TOKEN";
const ENV_MODEL: &str = "WORKERS_AI_MODEL";
const ENV_API_BASE: &str = "WORKERS_AI_API_BASE";

// ===============================================================================================
// 配置模块
// ===============================================================================================

/// 聊天客户端配置
///
/// 账户 ID 和令牌是进程级密钥，只在启动时读取一次
#[derive(Clone)]
pub struct Config {
    /// 账户/命名空间 ID
    pub(crate) account_id: String,
    /// Bearer 令牌
    pub(crate) api_token: String,
    /// 网关基础 URL
    pub(crate) api_base: String,
    /// 初始模型
    pub(crate) model: String,
    /// 系统提示词
    pub(crate) system_prompt: String,
    /// 最大生成 token 数
    pub(crate) max_tokens: u32,
    /// 建立连接的超时时间
    pub(crate) connect_timeout: Duration,
    /// 连接池空闲超时时间
    pub(crate) pool_idle_timeout: Duration,
    /// 每个主机的最大空闲连接数
    pub(crate) pool_max_idle_per_host: usize,
    /// TCP Keepalive
    pub(crate) tcp_keepalive: Duration,
    /// TCP Nodelay
    pub(crate) tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            api_token: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            model: DEFAULT_MODEL.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tokens: 2048,
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 4,
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

// 令牌不出现在日志里
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("account_id", &self.account_id)
            .field("api_token", &"***")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// 生成 Config Builder 方法的宏
///
/// 自动生成 `with_field_name` 形式的 builder 方法
macro_rules! config_builder {
    ($field:ident, $type:ty) => {
        paste::paste! {
            #[doc = "设置 `"]
            #[doc = stringify!($field)]
            #[doc = "`"]
            pub fn [<with_ $field>](mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        }
    };
}

impl Config {
    pub fn account_id(&self) -> &str { &self.account_id }
    pub fn api_base(&self) -> &str { &self.api_base }
    pub fn model(&self) -> &str { &self.model }
    pub fn system_prompt(&self) -> &str { &self.system_prompt }
    pub fn max_tokens(&self) -> u32 { self.max_tokens }
    pub fn connect_timeout(&self) -> Duration { self.connect_timeout }

    pub(crate) fn api_token(&self) -> &str { &self.api_token }

    /// 从环境变量和 `.env` 文件加载配置
    ///
    /// 环境变量会覆盖 `.env` 文件中的设置；缺少 `ID` 或 `API_TOKEN` 时返回配置错误
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过给定的查找函数加载配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ChatError::Config(format!("{} not found", key)))
        };

        let account_id = required(ENV_ACCOUNT_ID)?;
        let api_token = required(ENV_API_TOKEN)?;
        let defaults = Config::default();

        Ok(Config {
            account_id,
            api_token,
            model: lookup(ENV_MODEL).unwrap_or(defaults.model.clone()),
            api_base: lookup(ENV_API_BASE).unwrap_or(defaults.api_base.clone()),
            ..defaults
        })
    }

    // 使用宏生成 builder 方法
    config_builder!(account_id, String);
    config_builder!(api_token, String);
    config_builder!(api_base, String);
    config_builder!(model, String);
    config_builder!(system_prompt, String);
    config_builder!(max_tokens, u32);
    config_builder!(connect_timeout, Duration);
    config_builder!(pool_idle_timeout, Duration);
    config_builder!(pool_max_idle_per_host, usize);
    config_builder!(tcp_keepalive, Duration);
    config_builder!(tcp_nodelay, bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Tests that the default configuration is created correctly.
    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.api_token, "");
        assert!(KNOWN_MODELS.contains(&DEFAULT_MODEL));
    }

    /// Tests the builder methods for setting configuration fields.
    #[test]
    fn test_config_builder_methods() {
        let config = Config::default()
            .with_model("google/gemma-7b-it".to_string())
            .with_api_token("test_token".to_string())
            .with_max_tokens(512);

        assert_eq!(config.model, "google/gemma-7b-it");
        assert_eq!(config.api_token, "test_token");
        assert_eq!(config.max_tokens, 512);
    }

    /// Tests that both secrets are read and optional values fall back to defaults.
    #[test]
    fn test_from_lookup_with_secrets() {
        let config = Config::from_lookup(lookup_from(&[
            ("ID", "acct-123"),
            ("API_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.account_id, "acct-123");
        assert_eq!(config.api_token, "secret");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    /// Tests that optional overrides are honoured.
    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ID", "acct"),
            ("API_TOKEN", "secret"),
            ("WORKERS_AI_MODEL", "microsoft/phi-2"),
            ("WORKERS_AI_API_BASE", "http://localhost:8787"),
        ]))
        .unwrap();

        assert_eq!(config.model, "microsoft/phi-2");
        assert_eq!(config.api_base, "http://localhost:8787");
    }

    /// Tests that a missing account id is a configuration error.
    #[test]
    fn test_from_lookup_missing_account_id() {
        let result = Config::from_lookup(lookup_from(&[("API_TOKEN", "secret")]));
        assert!(matches!(result, Err(ChatError::Config(msg)) if msg.contains("ID")));
    }

    /// Tests that an empty token counts as missing.
    #[test]
    fn test_from_lookup_blank_token() {
        let result = Config::from_lookup(lookup_from(&[("ID", "acct"), ("API_TOKEN", "  ")]));
        assert!(matches!(result, Err(ChatError::Config(msg)) if msg.contains("API_TOKEN")));
    }

    /// Tests that the token is masked in debug output.
    #[test]
    fn test_debug_masks_token() {
        let config = Config::default().with_api_token("very-secret".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
    }
}
