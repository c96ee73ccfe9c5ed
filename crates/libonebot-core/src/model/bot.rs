//! Bot accounts served by an implementation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

// =====================================================================
// Selector
// =====================================================================

/// The `self` field of actions and events: which bot a payload belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotSelf {
    /// Platform name, e.g. `"qq"`.
    pub platform: String,
    /// Platform-scoped user id of the bot account.
    pub user_id: String,
}

impl BotSelf {
    pub fn new(platform: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            user_id: user_id.into(),
        }
    }
}

// =====================================================================
// Bot
// =====================================================================

struct BotInner {
    platform: String,
    user_id: String,
    online: RwLock<bool>,
    extra: Map<String, Value>,
}

/// One bot account.
///
/// The set of bots is fixed when the implementation is built; only the
/// online flag changes afterwards. Cloning shares the account, so a flag
/// flipped through one clone is visible through all of them.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Creates an online bot without platform extras.
    pub fn new(platform: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BotInner {
                platform: platform.into(),
                user_id: user_id.into(),
                online: RwLock::new(true),
                extra: Map::new(),
            }),
        }
    }

    /// Attaches platform-specific fields to the bot's status entry.
    ///
    /// Keys are emitted prefixed with the platform name, so `nickname`
    /// on platform `qq` shows up as `qq.nickname`.
    pub fn with_extra(self, extra: Map<String, Value>) -> Self {
        let inner = Arc::try_unwrap(self.inner).unwrap_or_else(|shared| BotInner {
            platform: shared.platform.clone(),
            user_id: shared.user_id.clone(),
            online: RwLock::new(*shared.online.read()),
            extra: shared.extra.clone(),
        });
        Self {
            inner: Arc::new(BotInner { extra, ..inner }),
        }
    }

    pub fn platform(&self) -> &str {
        &self.inner.platform
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Stable identity used for lookups and logging, `{platform}:{user_id}`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.inner.platform, self.inner.user_id)
    }

    pub fn selector(&self) -> BotSelf {
        BotSelf::new(&self.inner.platform, &self.inner.user_id)
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.read()
    }

    /// Flips the online flag, returning whether the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let mut guard = self.inner.online.write();
        let changed = *guard != online;
        *guard = online;
        changed
    }

    /// Whether this bot matches a wire selector.
    pub fn matches(&self, selector: &BotSelf) -> bool {
        self.inner.platform == selector.platform && self.inner.user_id == selector.user_id
    }

    /// The bot's entry in the `get_status` payload.
    ///
    /// Extra fields ride along under platform-prefixed keys.
    pub fn status_payload(&self) -> Value {
        let mut map = Map::new();
        map.insert("self".into(), json!(self.selector()));
        map.insert("online".into(), Value::Bool(self.is_online()));
        for (key, value) in &self.inner.extra {
            map.insert(
                format!("{}.{}", self.inner.platform, key),
                value.clone(),
            );
        }
        Value::Object(map)
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("platform", &self.inner.platform)
            .field("user_id", &self.inner.user_id)
            .field("online", &self.is_online())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_flag_is_shared_between_clones() {
        let bot = Bot::new("qq", "1234");
        let clone = bot.clone();
        assert!(clone.is_online());
        assert!(bot.set_online(false));
        assert!(!clone.is_online());
        // unchanged flag reports no change
        assert!(!bot.set_online(false));
    }

    #[test]
    fn status_payload_prefixes_extra_fields() {
        let mut extra = Map::new();
        extra.insert("nickname".into(), Value::String("Bot".into()));
        let bot = Bot::new("qq", "1234").with_extra(extra);

        let payload = bot.status_payload();
        assert_eq!(payload["self"]["platform"], "qq");
        assert_eq!(payload["self"]["user_id"], "1234");
        assert_eq!(payload["online"], true);
        assert_eq!(payload["qq.nickname"], "Bot");
    }

    #[test]
    fn selector_matching() {
        let bot = Bot::new("qq", "1234");
        assert!(bot.matches(&BotSelf::new("qq", "1234")));
        assert!(!bot.matches(&BotSelf::new("qq", "5678")));
        assert!(!bot.matches(&BotSelf::new("telegram", "1234")));
    }
}
