// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of provider webhook bodies into [`InboundMessage`].

use parley_core::types::InboundMessage;
use serde::Deserialize;

/// Field names seen across messaging providers.
#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(alias = "device", alias = "deviceId")]
    device_id: String,
    #[serde(default)]
    instance: Option<String>,
    #[serde(alias = "phone", alias = "from", alias = "sender")]
    phone_number: String,
    #[serde(default, alias = "message", alias = "body")]
    text: Option<String>,
    #[serde(default, alias = "mediaUrl", alias = "url")]
    media_url: Option<String>,
    #[serde(default, alias = "pushName", alias = "name")]
    sender_name: Option<String>,
    #[serde(default, alias = "from_me", alias = "fromMe")]
    from_operator: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookBody {
    Envelope { data: RawInbound },
    Flat(RawInbound),
}

/// Parses a webhook body in either the flat or the `{data: {...}}` shape.
pub fn normalize(body: &[u8]) -> Result<InboundMessage, String> {
    let raw = match serde_json::from_slice::<WebhookBody>(body)
        .map_err(|e| format!("unrecognized webhook payload: {e}"))?
    {
        WebhookBody::Envelope { data } => data,
        WebhookBody::Flat(raw) => raw,
    };

    // Providers address chats as `<number>@<domain>`.
    let phone = raw.phone_number.split('@').next().unwrap_or_default().trim();
    let device = raw.device_id.trim();
    if phone.is_empty() || device.is_empty() {
        return Err("device_id and phone_number must be non-empty".into());
    }

    Ok(InboundMessage {
        device_id: device.to_string(),
        instance: raw.instance,
        phone_number: phone.to_string(),
        text: raw.text.filter(|t| !t.is_empty()),
        media_url: raw.media_url.filter(|u| !u.is_empty()),
        sender_name: raw.sender_name,
        from_operator: raw.from_operator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_payload() {
        let msg = normalize(
            br#"{"device_id":"dev-1","instance":"i-1","phone_number":"60123","text":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.device_id, "dev-1");
        assert_eq!(msg.instance.as_deref(), Some("i-1"));
        assert_eq!(msg.text.as_deref(), Some("hi"));
        assert!(!msg.from_operator);
    }

    #[test]
    fn envelope_with_provider_field_names() {
        let msg = normalize(
            br#"{"event":"message","data":{"deviceId":"dev-2","from":"60999@s.whatsapp.net","message":"yo","pushName":"Ali","fromMe":true}}"#,
        )
        .unwrap();
        assert_eq!(msg.device_id, "dev-2");
        assert_eq!(msg.phone_number, "60999");
        assert_eq!(msg.text.as_deref(), Some("yo"));
        assert_eq!(msg.sender_name.as_deref(), Some("Ali"));
        assert!(msg.from_operator);
    }

    #[test]
    fn empty_text_is_none() {
        let msg = normalize(br#"{"device_id":"d","phone_number":"1","text":"","media_url":"https://x/a.jpg"}"#)
            .unwrap();
        assert!(msg.text.is_none());
        assert_eq!(msg.media_url.as_deref(), Some("https://x/a.jpg"));
    }

    #[test]
    fn missing_identity_is_rejected() {
        assert!(normalize(br#"{"text":"hi"}"#).is_err());
        assert!(normalize(br#"{"device_id":" ","phone_number":"1"}"#).is_err());
        assert!(normalize(b"not json").is_err());
    }
}
