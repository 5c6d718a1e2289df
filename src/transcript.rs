//! 对话记录模块
//!
//! 保存发送给上游的消息历史，以及展示用的问答对。纯数据，不做 I/O。
use crate::{
    error::{ChatError, Result},
    types::{Message, Role, TranscriptEntry},
    utils::message,
};
use std::sync::Arc;

/// 对话记录
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    system_prompt: String,
    messages: Vec<Message>,
    entries: Vec<Arc<TranscriptEntry>>,
    turn_open: bool,
}

impl TranscriptStore {
    /// 以给定的系统提示词创建一个新的对话记录
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![message(Role::System, &system_prompt)],
            system_prompt,
            entries: Vec::new(),
            turn_open: false,
        }
    }

    /// 追加用户回合，返回对应问答对的下标
    ///
    /// 上一回合尚未结束时返回 `InvalidState`，且不做任何修改
    pub fn append_user_turn(&mut self, question: &str) -> Result<usize> {
        if self.turn_open {
            return Err(ChatError::InvalidState(
                "a generation is already in flight".into(),
            ));
        }
        self.messages.push(message(Role::User, question));
        self.entries.push(Arc::new(TranscriptEntry {
            question: question.to_string(),
            answer: String::new(),
        }));
        self.turn_open = true;
        Ok(self.entries.len() - 1)
    }

    /// 覆盖最后一个问答对的回答
    ///
    /// 只有最后一条会在仍被快照引用时被复制。
    pub fn update_last_answer(&mut self, text: &str) -> Result<()> {
        let last = self.entries.last_mut().ok_or_else(|| {
            ChatError::InvalidState("no transcript entry to update".into())
        })?;
        let last = Arc::make_mut(last);
        last.answer.clear();
        last.answer.push_str(text);
        Ok(())
    }

    /// 将完成的回答写入上游历史
    pub fn commit_assistant_message(&mut self, text: &str) {
        self.messages.push(message(Role::Assistant, text));
    }

    /// 结束当前回合，允许下一次 `append_user_turn`
    pub fn close_turn(&mut self) {
        self.turn_open = false;
    }

    /// 恢复为只有系统消息的初始状态
    pub fn reset(&mut self) -> Result<()> {
        if self.turn_open {
            return Err(ChatError::InvalidState(
                "cannot reset while a generation is in flight".into(),
            ));
        }
        self.messages.clear();
        self.messages.push(message(Role::System, &self.system_prompt));
        self.entries.clear();
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn entries(&self) -> &[Arc<TranscriptEntry>] {
        &self.entries
    }

    pub fn last_entry(&self) -> Option<&TranscriptEntry> {
        self.entries.last().map(Arc::as_ref)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn is_turn_open(&self) -> bool {
        self.turn_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_count(store: &TranscriptStore) -> usize {
        store
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
    }

    #[test]
    fn new_store_holds_only_system_message() {
        let store = TranscriptStore::new("be nice");
        assert_eq!(store.messages(), &[message(Role::System, "be nice")]);
        assert!(store.entries().is_empty());
        assert!(!store.is_turn_open());
    }

    #[test]
    fn append_user_turn_adds_message_and_entry() {
        let mut store = TranscriptStore::new("sys");
        let idx = store.append_user_turn("hello").unwrap();

        assert_eq!(idx, 0);
        assert_eq!(store.messages().last(), Some(&message(Role::User, "hello")));
        assert_eq!(store.last_entry().unwrap().answer, "");
        assert_eq!(store.entries().len(), user_count(&store));
    }

    #[test]
    fn append_while_turn_open_is_rejected_without_side_effects() {
        let mut store = TranscriptStore::new("sys");
        store.append_user_turn("first").unwrap();

        let err = store.append_user_turn("second").unwrap_err();
        assert!(matches!(err, ChatError::InvalidState(_)));
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn update_last_answer_overwrites() {
        let mut store = TranscriptStore::new("sys");
        store.append_user_turn("q").unwrap();
        store.update_last_answer("He").unwrap();
        store.update_last_answer("Hello").unwrap();
        assert_eq!(store.last_entry().unwrap().answer, "Hello");
    }

    #[test]
    fn update_last_answer_on_empty_store_is_an_error() {
        let mut store = TranscriptStore::new("sys");
        assert!(matches!(
            store.update_last_answer("x"),
            Err(ChatError::InvalidState(_))
        ));
    }

    #[test]
    fn update_last_answer_leaves_shared_copies_untouched() {
        let mut store = TranscriptStore::new("sys");
        store.append_user_turn("q").unwrap();
        store.update_last_answer("He").unwrap();
        let published = store.entries().to_vec();

        store.update_last_answer("Hello").unwrap();

        assert_eq!(published[0].answer, "He");
        assert_eq!(store.last_entry().unwrap().answer, "Hello");
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut store = TranscriptStore::new("sys");
        for q in ["a", "b", "c"] {
            store.append_user_turn(q).unwrap();
            store.update_last_answer("answer").unwrap();
            store.commit_assistant_message("answer");
            store.close_turn();
        }
        assert_eq!(store.messages().len(), 7);

        store.reset().unwrap();
        assert_eq!(store.messages(), &[message(Role::System, "sys")]);
        assert!(store.entries().is_empty());
    }

    #[test]
    fn reset_refused_while_turn_open() {
        let mut store = TranscriptStore::new("sys");
        store.append_user_turn("q").unwrap();
        assert!(store.reset().is_err());
        assert_eq!(store.entries().len(), 1);
    }
}
