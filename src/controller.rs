//! 生成控制器模块
//!
//! 一次只允许一个进行中的回合。所有状态（对话记录、生成会话、阶段、模型）放在同一把锁后面，
//! 每个片段在持锁期间一次性折叠进去，锁从不跨越 `.await`，
//! 因此展示层读到的永远是某个片段折叠之前或之后的完整状态。
use crate::{
    client::{FragmentSource, StreamClient},
    config::Config,
    error::{ChatError, FetchFailure, Result},
    transcript::TranscriptStore,
    types::{ChatSnapshot, Fragment, Message, Phase, TurnOutcome},
    utils::FAILURE_PREFIX,
};
use futures::StreamExt;
use log::{debug, error, info};
use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch;

// ================================================================================================
// 内部状态
// ================================================================================================

/// 单个进行中请求的临时状态
#[derive(Debug, Default)]
struct GenerationSession {
    active: bool,
    accumulated: String,
}

#[derive(Debug)]
struct ChatState {
    store: TranscriptStore,
    session: Option<GenerationSession>,
    phase: Phase,
    model: String,
    last_outcome: Option<TurnOutcome>,
}

impl ChatState {
    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            entries: self.store.entries().to_vec(),
            phase: self.phase,
            generating: self.session.as_ref().is_some_and(|s| s.active),
            model: self.model.clone(),
            last_outcome: self.last_outcome.clone(),
        }
    }

    /// 销毁会话并回到 `Idle`
    fn finish(&mut self, outcome: TurnOutcome) {
        self.session = None;
        self.store.close_turn();
        self.phase = Phase::Idle;
        info!("Turn ended: {:?}", outcome);
        self.last_outcome = Some(outcome);
    }

    fn show_answer(&mut self, text: &str) {
        let updated = self.store.update_last_answer(text);
        debug_assert!(updated.is_ok(), "transcript out of sync with session");
        if let Err(e) = updated {
            error!("Transcript out of sync with session: {}", e);
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ChatState>,
    updates: watch::Sender<ChatSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ChatState) {
        self.updates.send_replace(state.snapshot());
    }

    /// 折叠一个片段；返回 `Break` 表示回合已结束
    fn fold(&self, next: Option<Fragment>) -> ControlFlow<TurnOutcome> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(session) = state.session.as_mut() else {
            return ControlFlow::Break(TurnOutcome::Cancelled);
        };
        state.phase = Phase::Streaming;

        let outcome = if !session.active {
            TurnOutcome::Cancelled
        } else {
            match next {
                Some(Fragment::Token(token)) => {
                    session.accumulated.push_str(&token);
                    let text = session.accumulated.clone();
                    state.show_answer(&text);
                    self.publish(state);
                    return ControlFlow::Continue(());
                }
                Some(Fragment::Done) => {
                    let text = std::mem::take(&mut session.accumulated);
                    state.store.commit_assistant_message(&text);
                    TurnOutcome::Finalized
                }
                Some(Fragment::Error(failure)) => {
                    state.show_answer(&format!("{}{}", FAILURE_PREFIX, failure));
                    TurnOutcome::Failed(failure)
                }
                None => {
                    let failure = FetchFailure::Transport("stream closed before [DONE]".into());
                    state.show_answer(&format!("{}{}", FAILURE_PREFIX, failure));
                    TurnOutcome::Failed(failure)
                }
            }
        };

        state.finish(outcome.clone());
        self.publish(state);
        ControlFlow::Break(outcome)
    }
}

// ================================================================================================
// 控制器
// ================================================================================================

/// 生成控制器
///
/// 句柄可以廉价克隆，所有克隆共享同一份对话。
#[derive(Debug)]
pub struct ChatController<S = StreamClient> {
    source: Arc<S>,
    shared: Arc<Shared>,
}

impl<S> Clone for ChatController<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl ChatController<StreamClient> {
    /// 用配置创建基于 Workers AI 的控制器
    pub fn from_config(config: Config) -> Self {
        let system_prompt = config.system_prompt().to_string();
        let model = config.model().to_string();
        Self::new(StreamClient::new(config), system_prompt, model)
    }
}

impl<S: FragmentSource> ChatController<S> {
    pub fn new(source: S, system_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        let state = ChatState {
            store: TranscriptStore::new(system_prompt),
            session: None,
            phase: Phase::Idle,
            model: model.into(),
            last_outcome: None,
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            source: Arc::new(source),
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                updates,
            }),
        }
    }

    /// 开始新的回合
    ///
    /// 只能在 `Idle` 阶段调用，否则返回 `InvalidState` 且不产生任何副作用。
    /// 返回的 [`Turn`] 需要被驱动（通常交给 `tokio::spawn`）。
    pub fn start(&self, question: &str) -> Result<Turn<S>> {
        let mut state = self.shared.lock();
        self.begin(&mut state, question)
    }

    /// 请求取消进行中的回合，在下一个片段边界生效
    pub fn cancel(&self) -> Result<()> {
        let mut state = self.shared.lock();
        self.request_cancel(&mut state)
    }

    /// 生成/停止 按钮：空闲时开始新回合，否则取消当前回合
    ///
    /// 判断和执行在同一次加锁内完成。
    pub fn toggle_generation(&self, question: &str) -> Result<Option<Turn<S>>> {
        let mut state = self.shared.lock();
        if state.phase == Phase::Idle {
            self.begin(&mut state, question).map(Some)
        } else {
            self.request_cancel(&mut state).map(|_| None)
        }
    }

    fn begin(&self, state: &mut ChatState, question: &str) -> Result<Turn<S>> {
        if state.phase != Phase::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot start a generation while {:?}",
                state.phase
            )));
        }

        state.store.append_user_turn(question)?;
        state.session = Some(GenerationSession {
            active: true,
            ..Default::default()
        });
        state.phase = Phase::Requesting;
        state.last_outcome = None;

        let turn = Turn {
            controller: self.clone(),
            model: state.model.clone(),
            messages: state.store.messages().to_vec(),
            finished: false,
        };
        debug!("Starting turn with model {}", turn.model);
        self.shared.publish(state);
        Ok(turn)
    }

    fn request_cancel(&self, state: &mut ChatState) -> Result<()> {
        match state.session.as_mut() {
            Some(session) => {
                session.active = false;
                debug!("Cancellation requested");
                self.shared.publish(state);
                Ok(())
            }
            None => Err(ChatError::InvalidState(
                "no generation in flight to cancel".into(),
            )),
        }
    }

    /// 切换下一轮使用的模型，不影响已经打开的流
    pub fn change_model(&self, model: impl Into<String>) {
        let mut state = self.shared.lock();
        state.model = model.into();
        self.shared.publish(&state);
    }

    /// 开始新对话，只能在 `Idle` 阶段调用
    pub fn reset_conversation(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot reset the conversation while {:?}",
                state.phase
            )));
        }
        state.store.reset()?;
        state.last_outcome = None;
        self.shared.publish(&state);
        Ok(())
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.lock().snapshot()
    }

    /// 订阅状态变化，每次完整的修改之后推送一份新快照
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.updates.subscribe()
    }

    /// 下一轮将要发送给上游的历史
    pub fn history(&self) -> Vec<Message> {
        self.shared.lock().store.messages().to_vec()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn model(&self) -> String {
        self.shared.lock().model.clone()
    }
}

// ================================================================================================
// 回合
// ================================================================================================

/// 一个进行中的回合
///
/// 持有本轮的模型和历史快照；在 `run` 完成之前被丢弃时，会话按取消处理。
#[derive(Debug)]
pub struct Turn<S = StreamClient> {
    controller: ChatController<S>,
    model: String,
    messages: Vec<Message>,
    finished: bool,
}

impl<S: FragmentSource> Turn<S> {
    pub fn model(&self) -> &str {
        &self.model
    }

    /// 打开片段流并逐个折叠，直到终态
    pub async fn run(mut self) -> TurnOutcome {
        let shared = self.controller.shared.clone();
        let mut fragments = self.controller.source.open(&self.model, &self.messages);

        let outcome = loop {
            let next = fragments.next().await;
            if let ControlFlow::Break(outcome) = shared.fold(next) {
                break outcome;
            }
        };

        // 释放连接
        drop(fragments);
        self.finished = true;
        outcome
    }
}

impl<S> Drop for Turn<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let shared = &self.controller.shared;
        let mut state = shared.lock();
        if state.session.is_some() {
            debug!("Turn dropped before completion");
            state.finish(TurnOutcome::Cancelled);
            shared.publish(&state);
        }
    }
}
