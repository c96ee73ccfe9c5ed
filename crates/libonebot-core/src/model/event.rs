//! Events pushed from the implementation to connected applications.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::bot::{Bot, BotSelf};
use super::segment::Segment;

// =====================================================================
// Kind
// =====================================================================

/// Top-level event category, the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Meta,
    Message,
    Notice,
    Request,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Meta => "meta",
            EventKind::Message => "message",
            EventKind::Notice => "notice",
            EventKind::Request => "request",
        }
    }
}

// =====================================================================
// Event
// =====================================================================

/// One protocol event.
///
/// The category-specific fields (`message_id`, `group_id`, ...) live in
/// `detail` and are flattened to the top level on the wire, matching the
/// OneBot 12 event shape. Platform extras are merged into `detail` under
/// platform-prefixed keys when attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub id: String,
    /// Seconds since the Unix epoch, fractional part carries milliseconds.
    pub time: f64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub detail_type: String,
    #[serde(default)]
    pub sub_type: String,
    /// The bot the event belongs to. Absent on meta events.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_: Option<BotSelf>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl Event {
    /// Creates an event with a fresh id and the current timestamp.
    pub fn new(kind: EventKind, detail_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            time: now_secs(),
            kind,
            detail_type: detail_type.into(),
            sub_type: String::new(),
            self_: None,
            detail: Map::new(),
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = sub_type.into();
        self
    }

    pub fn with_self(mut self, self_: BotSelf) -> Self {
        self.self_ = Some(self_);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.detail.insert(key.into(), value);
        self
    }

    /// Merges platform-specific fields into the event under prefixed keys,
    /// so `nickname` on platform `qq` is emitted as `qq.nickname`.
    pub fn with_extra(mut self, platform: &str, extra: Map<String, Value>) -> Self {
        for (key, value) in extra {
            self.detail.insert(format!("{platform}.{key}"), value);
        }
        self
    }

    /// The event as a wire value.
    pub fn payload(&self) -> Value {
        json!(self)
    }

    // =================================================================
    // Meta events
    // =================================================================

    /// `meta.connect`, the first event on every new WebSocket session.
    pub fn meta_connect(version: Value) -> Self {
        Event::new(EventKind::Meta, "connect").with_detail("version", version)
    }

    /// `meta.heartbeat` with the interval in milliseconds.
    pub fn meta_heartbeat(interval: i64) -> Self {
        Event::new(EventKind::Meta, "heartbeat").with_detail("interval", json!(interval))
    }

    /// `meta.status_update` carrying a full `get_status` payload.
    pub fn meta_status_update(status: Value) -> Self {
        Event::new(EventKind::Meta, "status_update").with_detail("status", status)
    }

    // =================================================================
    // Message events
    // =================================================================

    /// `message.private`.
    pub fn message_private(
        bot: &Bot,
        message_id: impl Into<String>,
        message: Vec<Segment>,
        alt_message: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Message, "private")
            .with_self(bot.selector())
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("message", json!(message))
            .with_detail("alt_message", json!(alt_message.into()))
            .with_detail("user_id", json!(user_id.into()))
    }

    /// `message.group`.
    pub fn message_group(
        bot: &Bot,
        message_id: impl Into<String>,
        message: Vec<Segment>,
        alt_message: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Message, "group")
            .with_self(bot.selector())
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("message", json!(message))
            .with_detail("alt_message", json!(alt_message.into()))
            .with_detail("group_id", json!(group_id.into()))
            .with_detail("user_id", json!(user_id.into()))
    }

    /// `message.channel`, a message in a channel of a guild.
    pub fn message_channel(
        bot: &Bot,
        message_id: impl Into<String>,
        message: Vec<Segment>,
        alt_message: impl Into<String>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Message, "channel")
            .with_self(bot.selector())
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("message", json!(message))
            .with_detail("alt_message", json!(alt_message.into()))
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("user_id", json!(user_id.into()))
    }

    // =================================================================
    // Notice events
    // =================================================================

    /// `notice.friend_increase`.
    pub fn notice_friend_increase(bot: &Bot, user_id: impl Into<String>) -> Self {
        Event::new(EventKind::Notice, "friend_increase")
            .with_self(bot.selector())
            .with_detail("user_id", json!(user_id.into()))
    }

    /// `notice.friend_decrease`.
    pub fn notice_friend_decrease(bot: &Bot, user_id: impl Into<String>) -> Self {
        Event::new(EventKind::Notice, "friend_decrease")
            .with_self(bot.selector())
            .with_detail("user_id", json!(user_id.into()))
    }

    /// `notice.private_message_delete`.
    pub fn notice_private_message_delete(
        bot: &Bot,
        message_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "private_message_delete")
            .with_self(bot.selector())
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("user_id", json!(user_id.into()))
    }

    /// `notice.group_member_increase` with sub-type `join` or `invite`.
    pub fn notice_group_member_increase(
        bot: &Bot,
        sub_type: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "group_member_increase")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("group_id", json!(group_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.group_member_decrease` with sub-type `leave` or `kick`.
    pub fn notice_group_member_decrease(
        bot: &Bot,
        sub_type: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "group_member_decrease")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("group_id", json!(group_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.group_message_delete` with sub-type `recall` or `delete`.
    pub fn notice_group_message_delete(
        bot: &Bot,
        sub_type: impl Into<String>,
        group_id: impl Into<String>,
        message_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "group_message_delete")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("group_id", json!(group_id.into()))
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.guild_member_increase` with sub-type `join` or `invite`.
    pub fn notice_guild_member_increase(
        bot: &Bot,
        sub_type: impl Into<String>,
        guild_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "guild_member_increase")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.guild_member_decrease` with sub-type `leave` or `kick`.
    pub fn notice_guild_member_decrease(
        bot: &Bot,
        sub_type: impl Into<String>,
        guild_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "guild_member_decrease")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.channel_member_increase` with sub-type `join` or `invite`.
    pub fn notice_channel_member_increase(
        bot: &Bot,
        sub_type: impl Into<String>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "channel_member_increase")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.channel_member_decrease` with sub-type `leave` or `kick`.
    pub fn notice_channel_member_decrease(
        bot: &Bot,
        sub_type: impl Into<String>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "channel_member_decrease")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.channel_message_delete` with sub-type `recall` or `delete`.
    pub fn notice_channel_message_delete(
        bot: &Bot,
        sub_type: impl Into<String>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        user_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "channel_message_delete")
            .with_sub_type(sub_type)
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("message_id", json!(message_id.into()))
            .with_detail("user_id", json!(user_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.channel_create`.
    pub fn notice_channel_create(
        bot: &Bot,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "channel_create")
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    /// `notice.channel_delete`.
    pub fn notice_channel_delete(
        bot: &Bot,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Event::new(EventKind::Notice, "channel_delete")
            .with_self(bot.selector())
            .with_detail("guild_id", json!(guild_id.into()))
            .with_detail("channel_id", json!(channel_id.into()))
            .with_detail("operator_id", json!(operator_id.into()))
    }

    // =================================================================
    // Request events
    // =================================================================

    /// Generic `request.*` event with implementation-defined fields.
    pub fn request(
        bot: &Bot,
        detail_type: impl Into<String>,
        detail: Map<String, Value>,
    ) -> Self {
        let mut event = Event::new(EventKind::Request, detail_type).with_self(bot.selector());
        event.detail.extend(detail);
        event
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_event_has_no_self() {
        let event = Event::meta_connect(json!({"impl": "test"}));
        let wire = event.payload();
        assert_eq!(wire["type"], "meta");
        assert_eq!(wire["detail_type"], "connect");
        assert_eq!(wire["sub_type"], "");
        assert_eq!(wire["version"]["impl"], "test");
        assert!(wire.get("self").is_none());
        assert!(wire["time"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn group_message_flattens_detail_fields() {
        let bot = Bot::new("qq", "1234");
        let event = Event::message_group(
            &bot,
            "msg-1",
            vec![Segment::text("hi")],
            "hi",
            "42",
            "99",
        );
        let wire = event.payload();
        assert_eq!(wire["type"], "message");
        assert_eq!(wire["detail_type"], "group");
        assert_eq!(wire["self"]["platform"], "qq");
        assert_eq!(wire["group_id"], "42");
        assert_eq!(wire["message"][0]["type"], "text");
        assert_eq!(wire["message"][0]["data"]["text"], "hi");
    }

    #[test]
    fn channel_message_carries_guild_and_channel_scope() {
        let bot = Bot::new("kook", "1");
        let event = Event::message_channel(
            &bot,
            "msg-9",
            vec![Segment::text("hey")],
            "hey",
            "g-1",
            "c-2",
            "u-3",
        );
        let wire = event.payload();
        assert_eq!(wire["type"], "message");
        assert_eq!(wire["detail_type"], "channel");
        assert_eq!(wire["guild_id"], "g-1");
        assert_eq!(wire["channel_id"], "c-2");
        assert_eq!(wire["user_id"], "u-3");
    }

    #[test]
    fn guild_and_channel_notices_follow_the_group_shape() {
        let bot = Bot::new("kook", "1");

        let joined = Event::notice_guild_member_increase(&bot, "join", "g-1", "u-2", "op");
        let wire = joined.payload();
        assert_eq!(wire["detail_type"], "guild_member_increase");
        assert_eq!(wire["sub_type"], "join");
        assert_eq!(wire["guild_id"], "g-1");
        assert_eq!(wire["operator_id"], "op");

        let deleted =
            Event::notice_channel_message_delete(&bot, "recall", "g-1", "c-2", "m-3", "u-4", "op");
        let wire = deleted.payload();
        assert_eq!(wire["detail_type"], "channel_message_delete");
        assert_eq!(wire["channel_id"], "c-2");
        assert_eq!(wire["message_id"], "m-3");

        // channel_create and channel_delete have no sub-type
        let created = Event::notice_channel_create(&bot, "g-1", "c-2", "op");
        let wire = created.payload();
        assert_eq!(wire["detail_type"], "channel_create");
        assert_eq!(wire["sub_type"], "");
        assert_eq!(wire["operator_id"], "op");
    }

    #[test]
    fn extras_are_platform_prefixed() {
        let mut extra = Map::new();
        extra.insert("shown".into(), json!(true));
        let event = Event::new(EventKind::Notice, "friend_increase").with_extra("qq", extra);
        assert_eq!(event.payload()["qq.shown"], true);
    }

    #[test]
    fn events_get_unique_ids() {
        let a = Event::meta_heartbeat(5000);
        let b = Event::meta_heartbeat(5000);
        assert_ne!(a.id, b.id);
    }
}
