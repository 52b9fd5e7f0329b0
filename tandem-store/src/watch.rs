//! Document change subscriptions.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::document::Document;

pin_project! {
    /// Snapshot stream for a single document.
    ///
    /// Yields the state at subscribe time immediately, then the latest
    /// state after each committed change. A slow consumer sees states
    /// coalesced, never reordered. Dropping the stream unsubscribes.
    pub struct DocumentWatch {
        #[pin]
        inner: WatchStream<Option<Document>>,
    }
}

impl DocumentWatch {
    pub(crate) fn new(receiver: watch::Receiver<Option<Document>>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl Stream for DocumentWatch {
    type Item = Option<Document>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Fields;
    use crate::path::DocPath;
    use chrono::Utc;
    use futures::StreamExt;

    fn snapshot(revision: u64) -> Document {
        Document {
            path: DocPath::parse("users/u1").unwrap(),
            fields: Fields::new(),
            revision,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_yields_current_state_first() {
        let (_sender, receiver) = watch::channel(Some(snapshot(1)));
        let mut stream = DocumentWatch::new(receiver);

        let first = stream.next().await.unwrap();
        assert_eq!(first.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_yields_latest_after_change() {
        let (sender, receiver) = watch::channel(None);
        let mut stream = DocumentWatch::new(receiver);

        assert!(stream.next().await.unwrap().is_none());

        sender.send_replace(Some(snapshot(2)));
        let next = stream.next().await.unwrap();
        assert_eq!(next.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_ends_when_sender_dropped() {
        let (sender, receiver) = watch::channel(None);
        let mut stream = DocumentWatch::new(receiver);
        assert!(stream.next().await.unwrap().is_none());

        drop(sender);
        assert!(stream.next().await.is_none());
    }
}
