//! Domain to protobuf conversions.

use crate::proto;
use ordbok::{Event, GenerationEntry, Item, Submission};

impl From<GenerationEntry> for proto::Entry {
    fn from(entry: GenerationEntry) -> Self {
        Self {
            explanation: entry.explanation,
            synonyms: entry.synonyms,
        }
    }
}

impl From<Item> for proto::Item {
    fn from(item: Item) -> Self {
        Self {
            word: item.word().to_string(),
            pending: item.is_pending(),
            created_at: item.created_at.to_rfc3339(),
            updated_at: item
                .updated_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
            entries: item.entries.into_iter().map(Into::into).collect(),
            key: item.key,
        }
    }
}

impl From<Item> for proto::ItemReply {
    fn from(item: Item) -> Self {
        Self {
            item: Some(item.into()),
        }
    }
}

impl From<Submission> for proto::SubmitReply {
    fn from(submission: Submission) -> Self {
        Self {
            item: Some(submission.item.into()),
            created: submission.created,
            enqueued: submission.enqueued,
        }
    }
}

impl From<Event> for proto::WorkerEvent {
    fn from(event: Event) -> Self {
        match event {
            Event::Ready { key, word } => Self {
                kind: proto::EventKind::Ready.into(),
                key,
                word,
                error: String::new(),
            },
            Event::Error { key, error } => Self {
                kind: proto::EventKind::Error.into(),
                key,
                word: String::new(),
                error,
            },
        }
    }
}
