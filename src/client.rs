//! 流式推理客户端模块
use crate::{
    config::Config,
    error::{ChatError, FetchFailure, Result},
    stream::{FragmentDecoder, FragmentStream},
    types::{ChatRequest, Fragment, Message},
    utils::endpoint_url,
};
use async_stream::stream;
use futures::StreamExt;
use log::{debug, error, warn};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use std::sync::Arc;

// ================================================================================================
// 片段来源
// ================================================================================================

/// 能为一段对话历史打开 `Fragment` 流的对象
///
/// 控制器只依赖这个 trait，测试中可以替换为脚本化的实现。
pub trait FragmentSource: Send + Sync {
    /// 打开一个惰性的片段流
    fn open(&self, model: &str, messages: &[Message]) -> FragmentStream;
}

// ================================================================================================
// 核心客户端模块
// ================================================================================================

/// Workers AI 流式客户端
#[derive(Debug, Clone)]
pub struct StreamClient {
    client: Arc<Client>,
    config: Arc<Config>,
    decoder: FragmentDecoder,
}

impl StreamClient {
    /// 创建一个新的 `StreamClient` 实例
    pub fn new(config: Config) -> Self {
        // 不设置整体超时，长回答的流可能持续很久
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(config.tcp_nodelay)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build reqwest client: {}", e);
                Client::new()
            });

        Self {
            client: Arc::new(client),
            config: Arc::new(config),
            decoder: FragmentDecoder::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 构建 API 请求所需的 HTTP 标头
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_token()))
                .map_err(|e| ChatError::InvalidRequest(format!("Invalid API token: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(headers)
    }

    /// 以完整历史发起流式请求
    ///
    /// 请求在第一次轮询时才真正发出。非 200 状态只产出一个 `Error(Status)`，不解析响应体。
    pub fn open(&self, model: &str, messages: &[Message]) -> FragmentStream {
        let headers = match self.build_headers() {
            Ok(headers) => headers,
            Err(e) => {
                return FragmentStream::once(Fragment::Error(FetchFailure::Transport(
                    e.to_string(),
                )));
            }
        };

        let url = endpoint_url(self.config.api_base(), self.config.account_id(), model);
        let request = self.client.post(&url).headers(headers).json(&ChatRequest {
            messages,
            stream: true,
            max_tokens: self.config.max_tokens(),
        });
        let decoder = self.decoder.clone();
        let model = model.to_string();
        let message_count = messages.len();

        FragmentStream::new(stream! {
            debug!("Opening stream: model={}, messages={}", model, message_count);
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Request to {} failed: {}", model, e);
                    yield Fragment::Error(FetchFailure::Transport(e.to_string()));
                    return;
                }
            };

            let status = response.status();
            if status != StatusCode::OK {
                warn!("Upstream returned status {} for {}", status, model);
                yield Fragment::Error(FetchFailure::Status(status.as_u16()));
                return;
            }

            let mut fragments = std::pin::pin!(decoder.decode(Box::pin(response.bytes_stream())));
            while let Some(fragment) = fragments.next().await {
                yield fragment;
            }
        })
    }
}

impl FragmentSource for StreamClient {
    fn open(&self, model: &str, messages: &[Message]) -> FragmentStream {
        StreamClient::open(self, model, messages)
    }
}
