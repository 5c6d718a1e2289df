//! 流式响应处理模块
use crate::{error::FetchFailure, types::{Fragment, StreamEvent}};
use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::debug;
use std::{
    fmt::Display,
    pin::Pin,
    task::{Context, Poll},
};

// ================================================================================================
// 行解码
// ================================================================================================

const DATA_PREFIX: &str = "data: ";
const DONE_CHUNK: &str = "[DONE]";
/// 单行的最大字节数，超过后按解码错误结束本轮
const MAX_LINE_BYTES: usize = 1 << 20;

/// 解码一行响应体
///
/// 只有以 `data: ` 开头的行才有意义，其余行（空行、注释）返回 `None`。
pub fn decode_line(line: &[u8]) -> Option<Fragment> {
    let payload = line.trim_ascii().strip_prefix(DATA_PREFIX.as_bytes())?;
    let fragment = match std::str::from_utf8(payload) {
        Err(e) => Fragment::Error(FetchFailure::Decode(format!(
            "invalid UTF-8 in event: {}",
            e
        ))),
        Ok(DONE_CHUNK) => Fragment::Done,
        Ok(data) => match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => Fragment::Token(event.response),
            Err(e) => Fragment::Error(FetchFailure::Decode(format!(
                "failed to parse event '{}': {}",
                data, e
            ))),
        },
    };
    Some(fragment)
}

// ================================================================================================
// 流式响应包装器
// ================================================================================================

/// 一个无状态的流处理器，把响应字节流按行解码为 [`Fragment`]
#[derive(Debug, Clone, Default)]
pub struct FragmentDecoder;

impl FragmentDecoder {
    pub fn new() -> Self {
        FragmentDecoder
    }

    /// 将字节流转换为 `Fragment` 流
    ///
    /// 每收到一块字节就尽可能多地解出完整的行，不会等待整个响应体。
    /// 产出 `Done` 或 `Error` 之后流立即结束；字节流在 `[DONE]` 之前结束视为传输错误。
    /// 每个字节只扫描一次，单行超过 1 MiB 时产出 `Decode` 错误。
    pub fn decode<S, E>(
        &self,
        mut bytes_stream: S,
    ) -> impl Stream<Item = Fragment> + Send + 'static + use<S, E>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
    {
        stream! {
            let mut buffer = BytesMut::new();
            // buffer[..scanned] 中没有换行
            let mut scanned = 0;
            let mut eof = false;

            loop {
                let newline = buffer[scanned..].iter().position(|b| *b == b'\n');
                let line = if let Some(pos) = newline {
                    let line = buffer.split_to(scanned + pos + 1);
                    scanned = 0;
                    line
                } else if buffer.len() > MAX_LINE_BYTES {
                    debug!("Dropping {} buffered bytes without a line break", buffer.len());
                    yield Fragment::Error(FetchFailure::Decode(format!(
                        "event line exceeds {} bytes",
                        MAX_LINE_BYTES
                    )));
                    return;
                } else if eof {
                    if buffer.is_empty() {
                        break;
                    }
                    // 末尾没有换行的最后一行
                    buffer.split()
                } else {
                    scanned = buffer.len();
                    match bytes_stream.next().await {
                        Some(Ok(bytes)) => {
                            buffer.extend_from_slice(&bytes);
                            continue;
                        }
                        Some(Err(e)) => {
                            yield Fragment::Error(FetchFailure::Transport(e.to_string()));
                            return;
                        }
                        None => {
                            eof = true;
                            continue;
                        }
                    }
                };

                match decode_line(&line) {
                    Some(Fragment::Token(token)) => yield Fragment::Token(token),
                    Some(terminal) => {
                        yield terminal;
                        return;
                    }
                    None => {}
                }
            }

            debug!("Response body ended without {}", DONE_CHUNK);
            yield Fragment::Error(FetchFailure::Transport(
                "stream closed before [DONE]".into(),
            ));
        }
    }
}

/// `Stream<Item = Fragment>` 的简单包装
///
/// 惰性、不可重启；丢弃它即释放底层连接。
pub struct FragmentStream {
    inner: Pin<Box<dyn Stream<Item = Fragment> + Send>>,
}

impl FragmentStream {
    pub fn new(stream: impl Stream<Item = Fragment> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// 只产出一个片段的流
    pub fn once(fragment: Fragment) -> Self {
        Self::new(futures::stream::once(async move { fragment }))
    }
}

impl Stream for FragmentStream {
    type Item = Fragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream").finish_non_exhaustive()
    }
}
