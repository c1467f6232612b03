//! Update → canonical message.
//!
//! Parsing is pure. Media kinds come back with the `file_id` that still needs
//! a `getFile` round-trip; the adapter resolves it and fills in `media_url`.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use leadline_channels::message::{Direction, Media, Message, MessageContent, Sender};
use leadline_core::ChannelType;

use crate::wire::{FileRef, TgMessage, Update};

/// A parsed update plus the file still to resolve, if any.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub message: Message,
    pub file_id: Option<String>,
}

pub(crate) fn parse_update(body: &Value) -> Option<Parsed> {
    let update: Update = match serde_json::from_value(body.clone()) {
        Ok(u) => u,
        Err(e) => {
            tracing::debug!(error = %e, "Telegram: body is not a recognizable update");
            return None;
        }
    };

    let (msg, edited) = match (update.message, update.edited_message, update.channel_post) {
        (Some(m), _, _) => (m, false),
        (None, Some(m), _) => (m, true),
        (None, None, Some(m)) => (m, false),
        // callback_query, inline_query, my_chat_member, ...
        (None, None, None) => return None,
    };

    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return None;
    }

    let (content, file_id, is_voice) = extract_content(&msg)?;

    let contact = msg.chat.id.to_string();
    // Channel posts may be anonymous; the chat itself speaks.
    let sender = match &msg.from {
        Some(user) => Sender::new(user.id.to_string(), user.display_name()),
        None => Sender::new(
            contact.clone(),
            msg.chat
                .title
                .clone()
                .or_else(|| msg.chat.username.clone())
                .unwrap_or_else(|| contact.clone()),
        ),
    };

    let timestamp = msg.date.and_then(from_unix).unwrap_or_else(Utc::now);

    let mut metadata = Map::new();
    metadata.insert("chatType".into(), Value::String(msg.chat.kind.clone()));
    metadata.insert("updateId".into(), Value::from(update.update_id));
    if edited {
        metadata.insert("edited".into(), Value::Bool(true));
    }
    if is_voice {
        metadata.insert("voice".into(), Value::Bool(true));
    }
    if let Some(title) = &msg.chat.title {
        metadata.insert("chatTitle".into(), Value::String(title.clone()));
    }
    metadata.insert("raw".into(), body.clone());

    let message = Message::new(
        ChannelType::Telegram,
        Direction::Inbound,
        msg.message_id.to_string(),
        &contact,
        content,
        sender,
        timestamp,
    )
    .with_metadata(metadata);

    Some(Parsed { message, file_id })
}

/// Pick the one populated sub-type. Returns the content, the file to
/// resolve, and whether the audio was a voice note.
fn extract_content(msg: &TgMessage) -> Option<(MessageContent, Option<String>, bool)> {
    if let Some(text) = &msg.text {
        return Some((MessageContent::text(text.clone()), None, false));
    }

    let caption = msg.caption.clone();
    let media = |file: &FileRef, default_mime: Option<&str>| {
        (
            Media {
                media_url: None,
                mime_type: file
                    .mime_type
                    .clone()
                    .or_else(|| default_mime.map(String::from)),
                caption: caption.clone(),
                file_name: file.file_name.clone(),
            },
            Some(file.file_id.clone()),
        )
    };

    // Highest resolution is last.
    if let Some(best) = msg.photo.as_ref().and_then(|sizes| sizes.last()) {
        let (m, id) = media(best, Some("image/jpeg"));
        return Some((MessageContent::Image(m), id, false));
    }
    if let Some(video) = &msg.video {
        let (m, id) = media(video, None);
        return Some((MessageContent::Video(m), id, false));
    }
    if let Some(audio) = &msg.audio {
        let (m, id) = media(audio, None);
        return Some((MessageContent::Audio(m), id, false));
    }
    if let Some(voice) = &msg.voice {
        let (m, id) = media(voice, Some("audio/ogg"));
        return Some((MessageContent::Audio(m), id, true));
    }
    if let Some(document) = &msg.document {
        let (m, id) = media(document, None);
        return Some((MessageContent::Document(m), id, false));
    }
    if let Some(sticker) = &msg.sticker {
        let (m, id) = media(sticker, Some("image/webp"));
        return Some((MessageContent::Sticker(m), id, false));
    }
    if let Some(loc) = &msg.location {
        return Some((
            MessageContent::Location {
                latitude: loc.latitude,
                longitude: loc.longitude,
                name: None,
                address: None,
            },
            None,
            false,
        ));
    }
    if let Some(c) = &msg.contact {
        let name = match &c.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", c.first_name, last),
            _ => c.first_name.clone(),
        };
        return Some((
            MessageContent::Contact {
                name,
                phone: Some(c.phone_number.clone()),
                vcard: c.vcard.clone(),
            },
            None,
            false,
        ));
    }
    None
}

/// Fill in the resolved URL on a media message.
pub(crate) fn set_media_url(content: &mut MessageContent, url: String) {
    match content {
        MessageContent::Image(m)
        | MessageContent::Video(m)
        | MessageContent::Audio(m)
        | MessageContent::Document(m)
        | MessageContent::Sticker(m) => m.media_url = Some(url),
        _ => {}
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
