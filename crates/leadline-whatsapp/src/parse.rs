//! Bridge envelope → canonical message.
//!
//! The bridge wraps each WhatsApp message in an envelope: a `key`
//! (`remoteJid`, `id`, `fromMe`, `participant`) plus a `message` object in
//! which exactly one type-specific field is populated. Fields are tried in a
//! fixed order (text forms, media forms, location, contact) and the first hit
//! decides the type.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use leadline_channels::message::{
    Direction, Media, Message, MessageContent, MessageStatus, Sender,
};
use leadline_core::ChannelType;

const GROUP_SUFFIX: &str = "@g.us";
const USER_SUFFIX: &str = "@s.whatsapp.net";
const STATUS_BROADCAST: &str = "status@broadcast";

/// How to treat envelopes we sent ourselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Live webhook: `fromMe` envelopes are echoes and are dropped.
    Webhook,
    /// History backfill: `fromMe` envelopes are our outbound messages.
    History,
}

/// Parse a full webhook body. Only `messages.upsert` events carry messages.
pub(crate) fn parse_webhook_body(body: &Value) -> Option<Message> {
    let event = body.get("event")?.as_str()?;
    if !is_upsert(event) {
        return None;
    }

    // Some bridge versions batch upserts into an array; only the first
    // element is a new message, the rest are history sync.
    let data = match body.get("data")? {
        Value::Array(items) => {
            if items.len() > 1 {
                debug!(
                    skipped = items.len() - 1,
                    "WhatsApp: batched upsert, parsing first element only"
                );
            }
            items.first()?
        }
        other => other,
    };

    let mut message = parse_envelope(data, Origin::Webhook)?;
    if let Some(instance) = body.get("instance").and_then(Value::as_str) {
        message
            .metadata
            .insert("instance".into(), Value::String(instance.to_string()));
    }
    message.metadata.insert("raw".into(), body.clone());
    Some(message)
}

/// `messages.upsert` in either dotted-lowercase or enum-style spelling.
pub(crate) fn is_upsert(event: &str) -> bool {
    event.to_ascii_lowercase().replace('_', ".") == "messages.upsert"
}

/// Parse one message envelope.
pub(crate) fn parse_envelope(data: &Value, origin: Origin) -> Option<Message> {
    let key = data.get("key")?;
    let remote_jid = key.get("remoteJid")?.as_str()?;
    let external_id = key.get("id")?.as_str()?;
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);

    if remote_jid == STATUS_BROADCAST {
        return None;
    }

    let direction = match (from_me, origin) {
        (true, Origin::Webhook) => return None,
        (true, Origin::History) => Direction::Outbound,
        (false, _) => Direction::Inbound,
    };

    let content = extract_content(unwrap_wrappers(data.get("message")?))?;

    let is_group = remote_jid.ends_with(GROUP_SUFFIX);
    let contact = strip_jid(remote_jid);
    let push_name = data.get("pushName").and_then(Value::as_str);

    // In groups the thread is the group; the author is the participant.
    let sender_id = if is_group {
        key.get("participant")
            .and_then(Value::as_str)
            .map(strip_jid)
            .unwrap_or(contact)
    } else {
        contact
    };
    let sender_name = push_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(sender_id);

    let timestamp = parse_timestamp(data.get("messageTimestamp")).unwrap_or_else(Utc::now);

    let mut metadata = Map::new();
    metadata.insert("isGroup".into(), Value::Bool(is_group));
    metadata.insert("remoteJid".into(), Value::String(remote_jid.to_string()));
    if let Some(name) = push_name {
        metadata.insert("pushName".into(), Value::String(name.to_string()));
    }
    if let Some(kind) = data.get("messageType").and_then(Value::as_str) {
        metadata.insert("messageType".into(), Value::String(kind.to_string()));
    }
    if origin == Origin::History {
        metadata.insert("raw".into(), data.clone());
    }

    let mut message = Message::new(
        ChannelType::WhatsApp,
        direction,
        external_id,
        contact,
        content,
        Sender::new(sender_id, sender_name),
        timestamp,
    )
    .with_metadata(metadata);

    if let Some(status) = data
        .get("status")
        .and_then(Value::as_str)
        .and_then(MessageStatus::from_bridge_ack)
    {
        message = message.with_status(status);
    }
    Some(message)
}

/// Peel disappearing / view-once wrappers down to the real message object.
fn unwrap_wrappers(message: &Value) -> &Value {
    const WRAPPERS: [&str; 3] = ["ephemeralMessage", "viewOnceMessage", "viewOnceMessageV2"];

    let mut current = message;
    'peel: for _ in 0..3 {
        for wrapper in WRAPPERS {
            if let Some(inner) = current.get(wrapper).and_then(|w| w.get("message")) {
                current = inner;
                continue 'peel;
            }
        }
        break;
    }
    current
}

fn extract_content(message: &Value) -> Option<MessageContent> {
    if let Some(text) = non_empty(message.get("conversation")) {
        return Some(MessageContent::text(text));
    }
    if let Some(text) = non_empty(message.get("extendedTextMessage").and_then(|m| m.get("text"))) {
        return Some(MessageContent::text(text));
    }

    let hosted_url = non_empty(message.get("mediaUrl"));
    if let Some(m) = message.get("imageMessage") {
        return Some(MessageContent::Image(media(m, hosted_url)));
    }
    if let Some(m) = message.get("videoMessage") {
        return Some(MessageContent::Video(media(m, hosted_url)));
    }
    if let Some(m) = message.get("audioMessage") {
        return Some(MessageContent::Audio(media(m, hosted_url)));
    }
    if let Some(m) = message.get("documentMessage").or_else(|| {
        message
            .get("documentWithCaptionMessage")?
            .get("message")?
            .get("documentMessage")
    }) {
        return Some(MessageContent::Document(media(m, hosted_url)));
    }
    if let Some(m) = message.get("stickerMessage") {
        return Some(MessageContent::Sticker(media(m, hosted_url)));
    }

    if let Some(loc) = message.get("locationMessage") {
        let latitude = loc.get("degreesLatitude")?.as_f64()?;
        let longitude = loc.get("degreesLongitude")?.as_f64()?;
        return Some(MessageContent::Location {
            latitude,
            longitude,
            name: non_empty(loc.get("name")).map(String::from),
            address: non_empty(loc.get("address")).map(String::from),
        });
    }

    if let Some(card) = message.get("contactMessage") {
        let vcard = non_empty(card.get("vcard"));
        return Some(MessageContent::Contact {
            name: non_empty(card.get("displayName")).unwrap_or("").to_string(),
            phone: vcard.and_then(phone_from_vcard),
            vcard: vcard.map(String::from),
        });
    }

    None
}

/// Build media content. A bridge-hosted URL (present when the bridge
/// re-uploads media) wins over the encrypted WhatsApp CDN URL.
fn media(m: &Value, hosted_url: Option<&str>) -> Media {
    Media {
        media_url: hosted_url
            .or_else(|| non_empty(m.get("url")))
            .map(String::from),
        mime_type: non_empty(m.get("mimetype")).map(String::from),
        caption: non_empty(m.get("caption")).map(String::from),
        file_name: non_empty(m.get("fileName")).map(String::from),
    }
}

/// `5511999990000@s.whatsapp.net` → `5511999990000`.
pub(crate) fn strip_jid(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Bridge recipient → remote JID, for endpoints that need the full form.
pub(crate) fn to_jid(number: &str) -> String {
    if number.contains('@') {
        number.to_string()
    } else {
        format!("{}{}", number, USER_SUFFIX)
    }
}

/// `waid=` parameter of the vCard TEL line, or the raw TEL value.
fn phone_from_vcard(vcard: &str) -> Option<String> {
    let tel = vcard.lines().find(|l| l.to_ascii_uppercase().contains("TEL"))?;
    if let Some(pos) = tel.find("waid=") {
        let digits: String = tel[pos + 5..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return Some(digits);
        }
    }
    tel.rsplit(':')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Seconds since epoch, as a number or numeric string.
fn parse_timestamp(v: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match v? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

fn non_empty(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_channels::message::MessageType;
    use serde_json::json;

    fn upsert(jid: &str, from_me: bool, message: Value) -> Value {
        json!({
            "event": "messages.upsert",
            "instance": "sales",
            "data": {
                "key": {"remoteJid": jid, "fromMe": from_me, "id": "3EB0A1"},
                "pushName": "Ana",
                "message": message,
                "messageTimestamp": 1_700_000_000,
            }
        })
    }

    #[test]
    fn conversation_text() {
        let body = upsert("5511999990000@s.whatsapp.net", false, json!({"conversation": "Oi"}));
        let msg = parse_webhook_body(&body).expect("message");
        assert_eq!(msg.kind(), MessageType::Text);
        assert_eq!(msg.content.as_text(), Some("Oi"));
        assert_eq!(msg.direction, Direction::Inbound);
        assert_eq!(msg.external_id, "3EB0A1");
        assert_eq!(msg.conversation_id, "wa_5511999990000");
        assert_eq!(msg.sender.name, "Ana");
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(msg.metadata["isGroup"], false);
        assert_eq!(msg.metadata["instance"], "sales");
        assert!(msg.metadata.contains_key("raw"));
    }

    #[test]
    fn from_me_is_dropped_on_webhook_but_kept_in_history() {
        let body = upsert("5511999990000@s.whatsapp.net", true, json!({"conversation": "echo"}));
        assert!(parse_webhook_body(&body).is_none());

        let msg = parse_envelope(&body["data"], Origin::History).expect("history message");
        assert_eq!(msg.direction, Direction::Outbound);
    }

    #[test]
    fn extended_text_and_enum_style_event_name() {
        let mut body = upsert(
            "5511999990000@s.whatsapp.net",
            false,
            json!({"extendedTextMessage": {"text": "see https://x.y"}}),
        );
        body["event"] = json!("MESSAGES_UPSERT");
        let msg = parse_webhook_body(&body).unwrap();
        assert_eq!(msg.content.as_text(), Some("see https://x.y"));
    }

    #[test]
    fn batched_upsert_parses_first_element() {
        let first = upsert("5511999990000@s.whatsapp.net", false, json!({"conversation": "novo"}));
        let mut synced = first["data"].clone();
        synced["key"]["id"] = json!("OLD1");
        synced["message"] = json!({"conversation": "antigo"});
        let body = json!({
            "event": "messages.upsert",
            "instance": "sales",
            "data": [first["data"].clone(), synced],
        });

        let msg = parse_webhook_body(&body).expect("first element");
        assert_eq!(msg.external_id, "3EB0A1");
        assert_eq!(msg.content.as_text(), Some("novo"));

        let empty = json!({"event": "messages.upsert", "instance": "sales", "data": []});
        assert!(parse_webhook_body(&empty).is_none());
    }

    #[test]
    fn non_upsert_events_are_ignored() {
        let mut body = upsert("5511@s.whatsapp.net", false, json!({"conversation": "x"}));
        body["event"] = json!("messages.update");
        assert!(parse_webhook_body(&body).is_none());
        body["event"] = json!("connection.update");
        assert!(parse_webhook_body(&body).is_none());
    }

    #[test]
    fn each_media_kind_maps_to_its_type_only() {
        let cases = [
            ("imageMessage", MessageType::Image),
            ("videoMessage", MessageType::Video),
            ("audioMessage", MessageType::Audio),
            ("documentMessage", MessageType::Document),
            ("stickerMessage", MessageType::Sticker),
        ];
        for (field, expected) in cases {
            let body = upsert(
                "5511@s.whatsapp.net",
                false,
                json!({ field: {"url": "https://mmg.whatsapp.net/x", "mimetype": "application/x-test"} }),
            );
            let msg = parse_webhook_body(&body).unwrap_or_else(|| panic!("{field} parses"));
            assert_eq!(msg.kind(), expected, "{field}");
            let media = msg.content.media().expect("media content");
            assert_eq!(media.media_url.as_deref(), Some("https://mmg.whatsapp.net/x"));
            assert!(media.caption.is_none() && media.file_name.is_none());
        }
    }

    #[test]
    fn document_keeps_file_name_and_caption() {
        let body = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"documentWithCaptionMessage": {"message": {"documentMessage": {
                "url": "https://mmg/x", "mimetype": "application/pdf",
                "fileName": "proposal.pdf", "caption": "our offer"
            }}}}),
        );
        let msg = parse_webhook_body(&body).unwrap();
        assert_eq!(msg.kind(), MessageType::Document);
        let media = msg.content.media().unwrap();
        assert_eq!(media.file_name.as_deref(), Some("proposal.pdf"));
        assert_eq!(media.caption.as_deref(), Some("our offer"));
    }

    #[test]
    fn hosted_media_url_wins() {
        let body = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"imageMessage": {"url": "https://mmg/enc"}, "mediaUrl": "https://s3/plain.jpg"}),
        );
        let msg = parse_webhook_body(&body).unwrap();
        assert_eq!(
            msg.content.media().unwrap().media_url.as_deref(),
            Some("https://s3/plain.jpg")
        );
    }

    #[test]
    fn text_takes_precedence_over_media() {
        let body = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"conversation": "hello", "imageMessage": {"url": "https://mmg/x"}}),
        );
        assert_eq!(parse_webhook_body(&body).unwrap().kind(), MessageType::Text);
    }

    #[test]
    fn location_and_contact() {
        let loc = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"locationMessage": {"degreesLatitude": -23.55, "degreesLongitude": -46.63, "name": "Office"}}),
        );
        match parse_webhook_body(&loc).unwrap().content {
            MessageContent::Location { latitude, longitude, name, address } => {
                assert_eq!((latitude, longitude), (-23.55, -46.63));
                assert_eq!(name.as_deref(), Some("Office"));
                assert!(address.is_none());
            }
            other => panic!("expected location, got {other:?}"),
        }

        let card = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"contactMessage": {
                "displayName": "Carlos",
                "vcard": "BEGIN:VCARD\nVERSION:3.0\nFN:Carlos\nTEL;type=CELL;waid=5521988887777:+55 21 98888-7777\nEND:VCARD"
            }}),
        );
        match parse_webhook_body(&card).unwrap().content {
            MessageContent::Contact { name, phone, vcard } => {
                assert_eq!(name, "Carlos");
                assert_eq!(phone.as_deref(), Some("5521988887777"));
                assert!(vcard.unwrap().starts_with("BEGIN:VCARD"));
            }
            other => panic!("expected contact, got {other:?}"),
        }
    }

    #[test]
    fn group_messages_keep_flag_and_participant() {
        let mut body = upsert("120363041234@g.us", false, json!({"conversation": "team"}));
        body["data"]["key"]["participant"] = json!("5511888880000@s.whatsapp.net");
        let msg = parse_webhook_body(&body).unwrap();
        assert_eq!(msg.conversation_id, "wa_120363041234");
        assert_eq!(msg.sender.id, "5511888880000");
        assert_eq!(msg.metadata["isGroup"], true);
    }

    #[test]
    fn unsupported_and_broadcast_yield_none() {
        let reaction = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"reactionMessage": {"text": "👍"}}),
        );
        assert!(parse_webhook_body(&reaction).is_none());

        let status = upsert("status@broadcast", false, json!({"conversation": "story"}));
        assert!(parse_webhook_body(&status).is_none());
    }

    #[test]
    fn ephemeral_wrapper_is_unwrapped() {
        let body = upsert(
            "5511@s.whatsapp.net",
            false,
            json!({"ephemeralMessage": {"message": {"conversation": "vanishing"}}}),
        );
        assert_eq!(parse_webhook_body(&body).unwrap().content.as_text(), Some("vanishing"));
    }

    #[test]
    fn string_timestamp_and_ack_status() {
        let mut body = upsert("5511@s.whatsapp.net", false, json!({"conversation": "x"}));
        body["data"]["messageTimestamp"] = json!("1700000123");
        body["data"]["status"] = json!("READ");
        let msg = parse_webhook_body(&body).unwrap();
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_123);
        assert_eq!(msg.status, MessageStatus::Read);
    }

    #[test]
    fn jid_helpers() {
        assert_eq!(strip_jid("5511@s.whatsapp.net"), "5511");
        assert_eq!(strip_jid("5511"), "5511");
        assert_eq!(to_jid("5511"), "5511@s.whatsapp.net");
        assert_eq!(to_jid("1203@g.us"), "1203@g.us");
    }
}
