// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! "onemessage" grouping of reply parts into outbound sends.

use parley_core::types::MediaKind;

use crate::parse::ReplyPart;

/// One outbound send derived from the reply parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Text(String),
    Media { kind: MediaKind, url: String },
}

impl Dispatch {
    /// Text recorded in the conversation log for this send.
    pub fn log_text(&self) -> &str {
        match self {
            Dispatch::Text(text) => text,
            Dispatch::Media { url, .. } => url,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Dispatch::Text(_) => MediaKind::Text,
            Dispatch::Media { kind, .. } => *kind,
        }
    }
}

/// Folds reply parts into the ordered send sequence.
///
/// Consecutive grouped text parts are joined with newlines into one send.
/// Any other part flushes the pending group before it is emitted on its own.
pub fn group_parts(parts: &[ReplyPart]) -> Vec<Dispatch> {
    let mut out = Vec::with_capacity(parts.len());
    let mut pending: Vec<&str> = Vec::new();

    for part in parts {
        if part.kind == MediaKind::Text && part.grouped {
            pending.push(&part.content);
            continue;
        }
        flush(&mut pending, &mut out);
        out.push(match part.kind {
            MediaKind::Text => Dispatch::Text(part.content.clone()),
            kind => Dispatch::Media {
                kind,
                url: part.content.clone(),
            },
        });
    }
    flush(&mut pending, &mut out);
    out
}

fn flush(pending: &mut Vec<&str>, out: &mut Vec<Dispatch>) {
    if !pending.is_empty() {
        out.push(Dispatch::Text(pending.join("\n")));
        pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(content: &str, grouped: bool) -> ReplyPart {
        ReplyPart {
            kind: MediaKind::Text,
            content: content.into(),
            grouped,
        }
    }

    fn image(url: &str) -> ReplyPart {
        ReplyPart {
            kind: MediaKind::Image,
            content: url.into(),
            grouped: false,
        }
    }

    #[test]
    fn grouped_run_is_split_by_media() {
        let parts = [
            text("a", true),
            text("b", true),
            image("https://cdn/p.jpg"),
            text("c", true),
        ];
        assert_eq!(
            group_parts(&parts),
            vec![
                Dispatch::Text("a\nb".into()),
                Dispatch::Media {
                    kind: MediaKind::Image,
                    url: "https://cdn/p.jpg".into()
                },
                Dispatch::Text("c".into()),
            ]
        );
    }

    #[test]
    fn ungrouped_text_flushes_and_sends_alone() {
        let parts = [text("a", true), text("b", false), text("c", false)];
        assert_eq!(
            group_parts(&parts),
            vec![
                Dispatch::Text("a".into()),
                Dispatch::Text("b".into()),
                Dispatch::Text("c".into()),
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert!(group_parts(&[]).is_empty());
    }

    fn arb_part() -> impl Strategy<Value = ReplyPart> {
        prop_oneof![
            ("[a-z]{1,6}", any::<bool>()).prop_map(|(c, g)| text(&c, g)),
            "[a-z]{1,6}".prop_map(|u| image(&u)),
        ]
    }

    proptest! {
        #[test]
        fn send_count_matches_runs(parts in prop::collection::vec(arb_part(), 0..24)) {
            let sends = group_parts(&parts);

            let mut expected = 0;
            let mut in_run = false;
            for p in &parts {
                if p.kind == MediaKind::Text && p.grouped {
                    if !in_run {
                        expected += 1;
                        in_run = true;
                    }
                } else {
                    expected += 1;
                    in_run = false;
                }
            }
            prop_assert_eq!(sends.len(), expected);
        }

        #[test]
        fn content_order_is_preserved(parts in prop::collection::vec(arb_part(), 0..24)) {
            let sends = group_parts(&parts);
            let flattened: Vec<String> = sends
                .iter()
                .flat_map(|d| d.log_text().split('\n').map(str::to_string).collect::<Vec<_>>())
                .collect();
            let original: Vec<String> = parts.iter().map(|p| p.content.clone()).collect();
            prop_assert_eq!(flattened, original);
        }

        #[test]
        fn media_is_never_merged(parts in prop::collection::vec(arb_part(), 0..24)) {
            let media_in = parts.iter().filter(|p| p.kind != MediaKind::Text).count();
            let media_out = group_parts(&parts)
                .iter()
                .filter(|d| matches!(d, Dispatch::Media { .. }))
                .count();
            prop_assert_eq!(media_in, media_out);
        }
    }
}
