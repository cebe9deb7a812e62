//! Conversation data model: messages, ids and the learner's settings.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Learner proficiency, which selects the tutor's vocabulary profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "Beginner (초급)")]
    Beginner,
    #[serde(rename = "Intermediate (중급)")]
    Intermediate,
    #[serde(rename = "Advanced (고급)")]
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    /// Full bilingual label, e.g. `"Beginner (초급)"`.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner (초급)",
            Level::Intermediate => "Intermediate (중급)",
            Level::Advanced => "Advanced (고급)",
        }
    }

    /// English name only, e.g. `"Beginner"`.
    pub fn short_name(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        }
    }

    /// Case-insensitive lookup by English name or its first letter.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "beginner" | "b" => Some(Level::Beginner),
            "intermediate" | "i" => Some(Level::Intermediate),
            "advanced" | "a" => Some(Level::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Conversation scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    General,
    Travel,
    Sightseeing,
    Restaurant,
    Shopping,
    Transport,
    Hotel,
    Business,
    Emergency,
}

impl Topic {
    /// Picker order.
    pub const ALL: [Topic; 9] = [
        Topic::General,
        Topic::Sightseeing,
        Topic::Restaurant,
        Topic::Transport,
        Topic::Shopping,
        Topic::Hotel,
        Topic::Travel,
        Topic::Business,
        Topic::Emergency,
    ];

    /// English identifier sent to the tutor.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::General => "General",
            Topic::Travel => "Travel",
            Topic::Sightseeing => "Sightseeing",
            Topic::Restaurant => "Restaurant",
            Topic::Shopping => "Shopping",
            Topic::Transport => "Transport",
            Topic::Hotel => "Hotel",
            Topic::Business => "Business",
            Topic::Emergency => "Emergency",
        }
    }

    /// Korean display name shown to the learner and used in the greeting.
    pub fn display_name(&self) -> &'static str {
        match self {
            Topic::General => "일반 대화",
            Topic::Sightseeing => "관광지 탐방",
            Topic::Restaurant => "음식점 이용",
            Topic::Transport => "대중교통",
            Topic::Shopping => "쇼핑과 환불",
            Topic::Hotel => "호텔 숙박",
            Topic::Travel => "여행 계획",
            Topic::Business => "비즈니스",
            Topic::Emergency => "긴급 상황",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Topic::General => "자유로운 일상 대화",
            Topic::Sightseeing => "길 찾기 및 명소 안내",
            Topic::Restaurant => "주문, 예약, 맛 표현",
            Topic::Transport => "티켓 구매 및 노선 문의",
            Topic::Shopping => "가격 흥정 및 사이즈 문의",
            Topic::Hotel => "체크인 및 서비스 요청",
            Topic::Travel => "일정 짜기 및 준비물",
            Topic::Business => "미팅 및 이메일 표현",
            Topic::Emergency => "병원 및 도움 요청",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Prebuilt synthesis voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Voice {
    Kore,
    Puck,
    Charon,
    Fenrir,
    Zephyr,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Kore,
        Voice::Puck,
        Voice::Charon,
        Voice::Fenrir,
        Voice::Zephyr,
    ];

    /// Voice name as understood by the speech API.
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Fenrir => "Fenrir",
            Voice::Zephyr => "Zephyr",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// UserSettings
// ---------------------------------------------------------------------------

/// The learner's persisted choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub level: Level,
    pub topic: Topic,
    pub voice: Voice,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            level: Level::Beginner,
            topic: Topic::General,
            voice: Voice::Kore,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Ordered, unique message identifier (milliseconds since the epoch, bumped
/// to stay strictly increasing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at: i64,
    /// Whether the message can be spoken (tutor replies, not error notices).
    #[serde(rename = "hasAudio", default)]
    pub has_audio: bool,
}

// ---------------------------------------------------------------------------
// MessageIdGenerator
// ---------------------------------------------------------------------------

/// Issues strictly increasing [`MessageId`]s from a millisecond clock.
///
/// When the clock has not advanced past the last issued id (two messages in
/// the same millisecond, or a clock step backwards) the previous id plus one
/// is used instead.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: u64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after the highest id in `messages`.
    pub fn seeded_from(messages: &[Message]) -> Self {
        Self {
            last: messages.iter().map(|m| m.id.0).max().unwrap_or(0),
        }
    }

    pub fn next_at(&mut self, now_ms: u64) -> MessageId {
        let id = now_ms.max(self.last + 1);
        self.last = id;
        MessageId(id)
    }

    pub fn next(&mut self) -> MessageId {
        self.next_at(now_millis().max(0) as u64)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing_within_one_millisecond() {
        let mut ids = MessageIdGenerator::new();
        let a = ids.next_at(1_000);
        let b = ids.next_at(1_000);
        let c = ids.next_at(999);
        let d = ids.next_at(5_000);

        assert_eq!(a, MessageId(1_000));
        assert_eq!(b, MessageId(1_001));
        assert_eq!(c, MessageId(1_002));
        assert_eq!(d, MessageId(5_000));
    }

    #[test]
    fn seeded_generator_continues_after_restored_log() {
        let restored = vec![Message {
            id: MessageId(u64::MAX / 2),
            role: Role::User,
            content: "hi".into(),
            created_at: 0,
            has_audio: false,
        }];
        let mut ids = MessageIdGenerator::seeded_from(&restored);
        assert!(ids.next() > MessageId(u64::MAX / 2));
    }

    #[test]
    fn settings_serialise_with_original_labels() {
        let json = serde_json::to_string(&UserSettings::default()).unwrap();
        assert_eq!(
            json,
            r#"{"level":"Beginner (초급)","topic":"General","voice":"Kore"}"#
        );

        let parsed: UserSettings = serde_json::from_str(
            r#"{"level":"Advanced (고급)","topic":"Hotel","voice":"Puck"}"#,
        )
        .unwrap();
        assert_eq!(parsed.level, Level::Advanced);
        assert_eq!(parsed.topic, Topic::Hotel);
        assert_eq!(parsed.voice, Voice::Puck);
    }

    #[test]
    fn message_json_shape() {
        let msg = Message {
            id: MessageId(42),
            role: Role::Assistant,
            content: "Hello!".into(),
            created_at: 7,
            has_audio: true,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["timestamp"], 7);
        assert_eq!(value["hasAudio"], true);
    }

    #[test]
    fn has_audio_defaults_to_false() {
        let msg: Message =
            serde_json::from_str(r#"{"id":1,"role":"user","content":"x","timestamp":1}"#)
                .unwrap();
        assert!(!msg.has_audio);
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(Level::parse("Intermediate"), Some(Level::Intermediate));
        assert_eq!(Level::parse("a"), Some(Level::Advanced));
        assert_eq!(Level::parse("expert"), None);
        assert_eq!(Topic::parse("restaurant"), Some(Topic::Restaurant));
        assert_eq!(Topic::parse("space"), None);
        assert_eq!(Voice::parse("zephyr"), Some(Voice::Zephyr));
        assert_eq!(Voice::parse("Alloy"), None);
    }

    #[test]
    fn level_names() {
        assert_eq!(Level::Beginner.short_name(), "Beginner");
        assert_eq!(Level::Advanced.to_string(), "Advanced (고급)");
        assert_eq!(Topic::Restaurant.display_name(), "음식점 이용");
    }
}
