//! 会话本地状态：只追加的聊天记录 + 输入提示

use crate::chat::frame::InboundFrame;
use crate::chat::types::{ChatMessage, ChatRole};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 只追加的聊天记录，按到达顺序排列，不去重
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn with_history(history: Vec<ChatMessage>) -> Self {
        Self { messages: history }
    }

    /// 追加一条消息，返回其位置
    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// 撤回 `index` 处的消息，仅当内容与 `message` 一致时生效
    pub fn retract(&mut self, index: usize, message: &ChatMessage) -> bool {
        if self.messages.get(index) == Some(message) {
            self.messages.remove(index);
            true
        } else {
            false
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 输入提示状态，按角色记录，超时自动清除
#[derive(Debug, Clone)]
pub struct TypingIndicators {
    timeout: Duration,
    deadlines: HashMap<ChatRole, Instant>,
}

impl TypingIndicators {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadlines: HashMap::new(),
        }
    }

    pub fn is_typing(&self, role: ChatRole) -> bool {
        self.deadlines.contains_key(&role)
    }

    /// 当前正在输入的角色（固定顺序：user、assistant、agent）
    pub fn active(&self) -> Vec<ChatRole> {
        [ChatRole::User, ChatRole::Assistant, ChatRole::Agent]
            .into_iter()
            .filter(|r| self.is_typing(*r))
            .collect()
    }

    pub fn set(&mut self, role: ChatRole, is_typing: bool, now: Instant) {
        if is_typing {
            self.deadlines.insert(role, now + self.timeout);
        } else {
            self.deadlines.remove(&role);
        }
    }

    pub fn clear_all(&mut self) {
        self.deadlines.clear();
    }

    /// 清除已超时的提示，返回被清除的角色
    pub fn expire(&mut self, now: Instant) -> Vec<ChatRole> {
        let expired: Vec<ChatRole> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(role, _)| *role)
            .collect();
        for role in &expired {
            self.deadlines.remove(role);
        }
        expired
    }

    /// 最近的超时时间点
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }
}

/// 应用入站帧后产生的变化
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Typing { role: ChatRole, is_typing: bool },
}

/// 单个会话的本地状态
#[derive(Debug, Clone)]
pub struct ChatState {
    pub transcript: Transcript,
    pub typing: TypingIndicators,
}

impl ChatState {
    pub fn new(history: Vec<ChatMessage>, typing_timeout: Duration) -> Self {
        Self {
            transcript: Transcript::with_history(history),
            typing: TypingIndicators::new(typing_timeout),
        }
    }

    /// 应用一个入站帧
    ///
    /// 任何帧到达都会先清空所有输入提示，输入提示帧再设置对应角色。
    /// 返回需要通知监听器的变化（输入提示只在状态翻转时通知）。
    pub fn apply(&mut self, frame: InboundFrame, now: Instant) -> Vec<ChatEvent> {
        let before = self.typing.active();
        self.typing.clear_all();

        let mut events = Vec::new();
        match frame {
            InboundFrame::Message(msg) | InboundFrame::Fallback(msg) => {
                self.transcript.push(msg.clone());
                events.push(ChatEvent::Message(msg));
            }
            InboundFrame::Typing { role, is_typing } => {
                self.typing.set(role, is_typing, now);
            }
            InboundFrame::ActiveUsers(users) => {
                debug!("[Chat] 会话通道收到在线列表帧，忽略 ({} 个用户)", users.len());
            }
            InboundFrame::ClientInfo { .. } => {
                debug!("[Chat] 会话通道收到 client_info 帧，忽略");
            }
        }

        let after = self.typing.active();
        for role in before.iter().filter(|r| !after.contains(r)) {
            events.push(ChatEvent::Typing {
                role: *role,
                is_typing: false,
            });
        }
        for role in after.iter().filter(|r| !before.contains(r)) {
            events.push(ChatEvent::Typing {
                role: *role,
                is_typing: true,
            });
        }
        events
    }

    /// 清除超时的输入提示
    pub fn expire_typing(&mut self, now: Instant) -> Vec<ChatEvent> {
        self.typing
            .expire(now)
            .into_iter()
            .map(|role| ChatEvent::Typing {
                role,
                is_typing: false,
            })
            .collect()
    }

    /// 本端消息在发送前追加，保证排在它引起的回复之前
    pub fn record_outgoing(&mut self, message: ChatMessage) -> usize {
        self.transcript.push(message)
    }

    /// 发送失败时撤回之前追加的本端消息
    pub fn retract_outgoing(&mut self, index: usize, message: &ChatMessage) {
        if !self.transcript.retract(index, message) {
            debug!("[Chat] 待撤回的本端消息已不在原位置，忽略");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::frame::decode_inbound;

    fn state() -> ChatState {
        ChatState::new(vec![], Duration::from_secs(5))
    }

    #[test]
    fn messages_are_appended_in_arrival_order() {
        let mut s = ChatState::new(
            vec![ChatMessage::now(ChatRole::User, "first")],
            Duration::from_secs(5),
        );
        let now = Instant::now();
        s.apply(decode_inbound(r#"{"type":"message","from":"assistant","content":"second"}"#), now);
        s.apply(decode_inbound("third"), now);
        s.apply(decode_inbound(r#"{"type":"message","from":"assistant","content":"second"}"#), now);

        let contents: Vec<&str> = s.transcript.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third", "second"]);
    }

    #[test]
    fn every_malformed_frame_adds_exactly_one_entry() {
        let mut s = state();
        let now = Instant::now();
        for (i, raw) in ["oops", "{", "[]", r#"{"type":"nope"}"#].iter().enumerate() {
            let events = s.apply(decode_inbound(raw), now);
            assert_eq!(s.transcript.len(), i + 1);
            assert!(matches!(&events[..], [ChatEvent::Message(m)] if m.content == *raw));
        }
    }

    #[test]
    fn typing_frame_replaces_previous_indicator() {
        let mut s = state();
        let now = Instant::now();

        let events = s.apply(decode_inbound(r#"{"type":"typing","from":"user","is_typing":true}"#), now);
        assert_eq!(events, vec![ChatEvent::Typing { role: ChatRole::User, is_typing: true }]);

        let events = s.apply(
            decode_inbound(r#"{"type":"typing","from":"assistant","is_typing":true}"#),
            now,
        );
        assert_eq!(
            events,
            vec![
                ChatEvent::Typing { role: ChatRole::User, is_typing: false },
                ChatEvent::Typing { role: ChatRole::Assistant, is_typing: true },
            ]
        );
        assert_eq!(s.typing.active(), vec![ChatRole::Assistant]);
    }

    #[test]
    fn repeated_typing_frame_does_not_renotify() {
        let mut s = state();
        let now = Instant::now();
        let frame = r#"{"type":"typing","from":"user","is_typing":true}"#;
        s.apply(decode_inbound(frame), now);
        assert!(s.apply(decode_inbound(frame), now).is_empty());
        assert!(s.typing.is_typing(ChatRole::User));
    }

    #[test]
    fn message_clears_typing() {
        let mut s = state();
        let now = Instant::now();
        s.apply(decode_inbound(r#"{"type":"typing","from":"assistant","is_typing":true}"#), now);
        let events = s.apply(
            decode_inbound(r#"{"type":"message","from":"assistant","content":"done"}"#),
            now,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatEvent::Typing { role: ChatRole::Assistant, is_typing: false }));
        assert!(s.typing.active().is_empty());
    }

    #[test]
    fn typing_auto_clears_after_timeout() {
        let mut s = state();
        let start = Instant::now();
        s.apply(decode_inbound(r#"{"type":"typing","from":"user","is_typing":true}"#), start);
        assert_eq!(s.typing.next_deadline(), Some(start + Duration::from_secs(5)));

        assert!(s.expire_typing(start + Duration::from_secs(4)).is_empty());
        assert!(s.typing.is_typing(ChatRole::User));

        let events = s.expire_typing(start + Duration::from_secs(5));
        assert_eq!(events, vec![ChatEvent::Typing { role: ChatRole::User, is_typing: false }]);
        assert!(s.typing.next_deadline().is_none());
    }

    #[test]
    fn control_frames_do_not_touch_transcript() {
        let mut s = state();
        let now = Instant::now();
        s.apply(decode_inbound(r#"{"type":"client_info","country_code":"91"}"#), now);
        s.apply(decode_inbound(r#"{"type":"active_users","data":[]}"#), now);
        assert!(s.transcript.is_empty());
    }

    #[test]
    fn retracting_outgoing_keeps_later_arrivals() {
        let mut s = state();
        let question = ChatMessage::now(ChatRole::User, "question");
        let index = s.record_outgoing(question.clone());
        s.apply(decode_inbound("late frame"), Instant::now());

        s.retract_outgoing(index, &question);
        let contents: Vec<&str> = s.transcript.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["late frame"]);

        // 位置已不匹配时不误删
        s.retract_outgoing(0, &question);
        assert_eq!(s.transcript.len(), 1);
    }
}
