//! Message segments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One message segment, `{type, data}` on the wire.
///
/// Constructors cover the OneBot 12 standard segment set; anything
/// platform-specific goes through [`Segment::custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    /// Segment of an arbitrary type.
    pub fn custom(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("text".into(), json!(text.into()));
        Self::custom("text", data)
    }

    pub fn mention(user_id: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("user_id".into(), json!(user_id.into()));
        Self::custom("mention", data)
    }

    pub fn mention_all() -> Self {
        Self::custom("mention_all", Map::new())
    }

    pub fn image(file_id: impl Into<String>) -> Self {
        Self::file_like("image", file_id)
    }

    pub fn voice(file_id: impl Into<String>) -> Self {
        Self::file_like("voice", file_id)
    }

    pub fn audio(file_id: impl Into<String>) -> Self {
        Self::file_like("audio", file_id)
    }

    pub fn video(file_id: impl Into<String>) -> Self {
        Self::file_like("video", file_id)
    }

    pub fn file(file_id: impl Into<String>) -> Self {
        Self::file_like("file", file_id)
    }

    pub fn location(
        latitude: f64,
        longitude: f64,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut data = Map::new();
        data.insert("latitude".into(), json!(latitude));
        data.insert("longitude".into(), json!(longitude));
        data.insert("title".into(), json!(title.into()));
        data.insert("content".into(), json!(content.into()));
        Self::custom("location", data)
    }

    pub fn reply(message_id: impl Into<String>, user_id: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("message_id".into(), json!(message_id.into()));
        if let Some(user_id) = user_id {
            data.insert("user_id".into(), json!(user_id));
        }
        Self::custom("reply", data)
    }

    fn file_like(kind: &str, file_id: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("file_id".into(), json!(file_id.into()));
        Self::custom(kind, data)
    }

    /// A field of the segment's data, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Plain-text rendition used for `alt_message`.
    ///
    /// Text segments contribute their text, mentions a rough marker,
    /// everything else an empty string.
    pub fn alt(&self) -> String {
        match self.kind.as_str() {
            "text" => self
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            "mention" => self
                .get("user_id")
                .and_then(Value::as_str)
                .map(|id| format!("@{id}"))
                .unwrap_or_default(),
            "mention_all" => "@all".into(),
            _ => String::new(),
        }
    }
}

/// Joins the plain-text rendition of a whole message.
pub fn alt_message(segments: &[Segment]) -> String {
    segments.iter().map(Segment::alt).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_segment_wire_shape() {
        let wire = serde_json::to_value(Segment::text("hello")).unwrap();
        assert_eq!(wire["type"], "text");
        assert_eq!(wire["data"]["text"], "hello");
    }

    #[test]
    fn reply_omits_absent_user_id() {
        let seg = Segment::reply("msg-1", None);
        assert!(seg.get("user_id").is_none());
        let seg = Segment::reply("msg-1", Some("99".into()));
        assert_eq!(seg.get("user_id").unwrap(), "99");
    }

    #[test]
    fn alt_message_concatenates_text() {
        let segments = vec![
            Segment::mention("42"),
            Segment::text(" hello "),
            Segment::image("f.png"),
            Segment::mention_all(),
        ];
        assert_eq!(alt_message(&segments), "@42 hello @all");
    }

    #[test]
    fn segment_roundtrips_unknown_types() {
        let mut data = Map::new();
        data.insert("face_id".into(), json!(17));
        let seg = Segment::custom("qq.face", data);
        let back: Segment =
            serde_json::from_value(serde_json::to_value(&seg).unwrap()).unwrap();
        assert_eq!(back, seg);
    }
}
