use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatline_types::{Attachment, ErrorBlock};
use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};

use super::*;
use crate::alert::{Alert, ChannelAlerts, STREAM_ERROR_TITLE, UPDATE_ERROR_TITLE};
use crate::store::StoreErrorKind;

/// Streams fed by the test through channels, one per URL.
#[derive(Default)]
struct ChannelConnector {
    streams: Mutex<HashMap<String, mpsc::UnboundedReceiver<StreamEvent>>>,
}

impl ChannelConnector {
    fn script(&self, url: &str) -> mpsc::UnboundedSender<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().insert(url.to_string(), rx);
        tx
    }
}

impl Connector for ChannelConnector {
    fn connect(&self, url: &str) -> BoxStream<'static, StreamEvent> {
        match self.streams.lock().unwrap().remove(url) {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }
}

#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<(UpdateMessagePayload, UpdateOptions)>>,
    fail_with: Mutex<Option<StoreError>>,
}

impl MessageStore for RecordingStore {
    fn update_message(
        &self,
        payload: UpdateMessagePayload,
        options: UpdateOptions,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.calls.lock().unwrap().push((payload, options));
        let outcome = match self.fail_with.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        async move { outcome }.boxed()
    }
}

struct Harness {
    session: Session,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    alerts: mpsc::UnboundedReceiver<Alert>,
    connector: Arc<ChannelConnector>,
    store: Arc<RecordingStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_context(SessionContext {
            flow_id: "flow-1".into(),
            session_id: Some("session-1".into()),
            refetch: true,
        })
    }

    fn with_context(context: SessionContext) -> Self {
        let connector = Arc::new(ChannelConnector::default());
        let store = Arc::new(RecordingStore::default());
        let (alert_sink, alerts) = ChannelAlerts::channel();
        let (session, updates) = Session::new(
            Collaborators {
                connector: Arc::clone(&connector) as Arc<dyn Connector>,
                store: Arc::clone(&store) as Arc<dyn MessageStore>,
                alerts: Arc::new(alert_sink),
            },
            context,
        );
        Self {
            session,
            updates,
            alerts,
            connector,
            store,
        }
    }

    async fn step(&mut self) {
        tokio::time::timeout(Duration::from_secs(5), self.session.step())
            .await
            .expect("session event");
    }

    /// Presented segments without the leading header.
    fn body(&self, id: &MessageId) -> Vec<Segment> {
        self.session
            .present(id)
            .map(|segments| segments.into_iter().skip(1).collect())
            .unwrap_or_default()
    }

    fn take_updates(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            updates.push(update);
        }
        updates
    }
}

fn chunk(text: &str) -> StreamEvent {
    StreamEvent::Chunk(text.to_string())
}

#[tokio::test]
async fn test_stream_settles_with_concatenated_text() {
    let mut h = Harness::new();
    let tx = h.connector.script("/stream/m1");
    let id = h.session.push(Message::machine_streaming("/stream/m1").with_id("m1"));

    assert_eq!(h.session.phase(&id), Some(MessagePhase::Streaming));
    assert!(h.session.lock().is_locked());
    assert_eq!(h.body(&id), vec![Segment::Working]);

    for part in ["Hel", "lo, ", "world"] {
        tx.send(chunk(part)).unwrap();
        h.step().await;
    }
    tx.send(StreamEvent::Closed).unwrap();
    h.step().await;

    assert_eq!(h.session.phase(&id), Some(MessagePhase::Settled));
    assert_eq!(h.session.message(&id).unwrap().text, "Hello, world");
    assert!(!h.session.lock().is_locked());

    let updates = h.take_updates();
    assert!(updates.contains(&SessionUpdate::LockChanged(true)));
    assert!(updates.contains(&SessionUpdate::FinalText {
        id: id.clone(),
        text: "Hello, world".into()
    }));
    assert_eq!(updates.last(), Some(&SessionUpdate::Changed(id)));
    assert!(updates.contains(&SessionUpdate::LockChanged(false)));
}

#[tokio::test]
async fn test_lock_held_until_last_stream_settles() {
    let mut h = Harness::new();
    let tx_a = h.connector.script("/a");
    let tx_b = h.connector.script("/b");
    let a = h.session.push(Message::machine_streaming("/a"));
    let b = h.session.push(Message::machine_streaming("/b"));
    assert_eq!(h.session.lock().streaming_count(), 2);

    tx_a.send(StreamEvent::Closed).unwrap();
    h.step().await;
    assert_eq!(h.session.phase(&a), Some(MessagePhase::Settled));
    assert!(h.session.lock().is_locked(), "b is still streaming");

    tx_b.send(StreamEvent::Failed { message: None }).unwrap();
    h.step().await;
    assert_eq!(h.session.phase(&b), Some(MessagePhase::Errored));
    assert!(!h.session.lock().is_locked());
    assert!(!h.session.has_active_streams());
}

#[tokio::test]
async fn test_stream_error_alerts_once_and_keeps_partial_text() {
    let mut h = Harness::new();
    let tx = h.connector.script("/s");
    let id = h.session.push(Message::machine_streaming("/s"));

    tx.send(chunk("partial ")).unwrap();
    h.step().await;
    tx.send(StreamEvent::Failed {
        message: Some("Flow crashed".into()),
    })
    .unwrap();
    h.step().await;

    assert_eq!(h.session.phase(&id), Some(MessagePhase::Errored));
    assert_eq!(h.session.message(&id).unwrap().text, "partial ");
    assert_eq!(
        h.alerts.try_recv().unwrap(),
        Alert::new(STREAM_ERROR_TITLE, vec!["Flow crashed".into()])
    );
    assert!(h.alerts.try_recv().is_err());
    assert!(h.take_updates().contains(&SessionUpdate::FinalText {
        id,
        text: "partial ".into()
    }));
}

#[tokio::test]
async fn test_forced_teardown_mid_stream_closes_connection() {
    let mut h = Harness::new();
    let tx = h.connector.script("/s");
    let id = h.session.push(Message::machine_streaming("/s"));

    tx.send(chunk("first")).unwrap();
    h.step().await;
    // Queued but not yet handled when teardown happens.
    tx.send(chunk("second")).unwrap();
    tokio::task::yield_now().await;

    assert!(h.session.remove(&id));
    assert!(!h.session.lock().is_locked());
    assert!(h.session.message(&id).is_none());

    tokio::time::timeout(Duration::from_secs(5), tx.closed())
        .await
        .expect("stream connection released");

    // Late events are ignored without touching anything.
    let _ = tx.send(chunk("third"));
    h.session.drain();
    assert!(h.session.message(&id).is_none());
    assert!(!h.session.lock().is_locked());
    assert!(!h.session.remove(&id));
}

#[tokio::test]
async fn test_replacing_message_ignores_old_stream() {
    let mut h = Harness::new();
    let tx_old = h.connector.script("/old");
    let id = h.session.push(Message::machine_streaming("/old").with_id("dup"));

    tx_old.send(chunk("STALE")).unwrap();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    let tx_new = h.connector.script("/new");
    assert_eq!(
        h.session.push(Message::machine_streaming("/new").with_id("dup")),
        id
    );
    tokio::time::timeout(Duration::from_secs(5), tx_old.closed())
        .await
        .expect("old stream released");

    tx_new.send(chunk("fresh")).unwrap();
    while h.session.message(&id).unwrap().text.is_empty() {
        h.step().await;
    }
    h.session.drain();

    assert_eq!(h.session.message(&id).unwrap().text, "fresh");
    assert_eq!(h.session.phase(&id), Some(MessagePhase::Streaming));
    assert!(h.session.lock().is_locked());

    assert!(h.session.remove(&id));
    tokio::time::timeout(Duration::from_secs(5), tx_new.closed())
        .await
        .expect("new stream released on remove");
    assert!(!h.session.lock().is_locked());
}

#[tokio::test]
async fn test_edit_result_for_replaced_message_is_ignored() {
    let mut h = Harness::new();
    let id = h.session.push(Message::user("draft").with_id("u1"));
    h.session.begin_edit(&id).unwrap();
    h.session.commit_edit(&id, "edited").unwrap();

    h.session.push(Message::user("replacement").with_id("u1"));
    h.step().await;

    let message = h.session.message(&id).unwrap();
    assert_eq!(message.text, "replacement");
    assert!(!message.edited);
    assert_eq!(h.session.phase(&id), Some(MessagePhase::Settled));
    assert!(!h.take_updates().contains(&SessionUpdate::Edited(id)));
}

#[tokio::test]
async fn test_edit_commit_persists_full_payload() {
    let mut h = Harness::new();
    let message = Message::user("old text")
        .with_id("u1")
        .with_files(vec![Attachment::Described {
            path: "f/report.pdf".into(),
            kind: "pdf".into(),
            name: "report".into(),
        }]);
    let id = h.session.push(message);

    h.session.begin_edit(&id).unwrap();
    assert_eq!(
        h.body(&id),
        vec![Segment::Editor {
            text: "old text".into()
        }]
    );
    h.session.commit_edit(&id, "new text").unwrap();
    assert_eq!(
        h.session.commit_edit(&id, "newer"),
        Err(EditError::CommitInFlight)
    );
    assert_eq!(h.session.message(&id).unwrap().text, "old text");

    h.step().await;

    let message = h.session.message(&id).unwrap();
    assert_eq!(message.text, "new text");
    assert!(message.edited);
    assert_eq!(h.session.phase(&id), Some(MessagePhase::Settled));

    let calls = h.store.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (payload, options) = &calls[0];
    assert_eq!(payload.id, "u1");
    assert_eq!(payload.text, "new text");
    assert_eq!(payload.files, vec!["f/report.pdf".to_string()]);
    assert_eq!(payload.flow_id, "flow-1");
    assert_eq!(payload.session_id, "session-1");
    assert!(options.refetch);

    let updates = h.take_updates();
    assert!(updates.contains(&SessionUpdate::Edited(id)));
    assert!(updates.contains(&SessionUpdate::RefetchRequested));
}

#[tokio::test]
async fn test_edit_failure_keeps_pre_edit_text() {
    let mut h = Harness::with_context(SessionContext::default());
    *h.store.fail_with.lock().unwrap() = Some(StoreError::new(StoreErrorKind::HttpStatus, "HTTP 500"));
    let id = h.session.push(Message::machine("keep me"));

    h.session.begin_edit(&id).unwrap();
    h.session.commit_edit(&id, "lost").unwrap();
    h.step().await;

    assert_eq!(h.session.phase(&id), Some(MessagePhase::Editing));
    let message = h.session.message(&id).unwrap();
    assert_eq!(message.text, "keep me");
    assert!(!message.edited);
    assert_eq!(
        h.alerts.try_recv().unwrap(),
        Alert::new(UPDATE_ERROR_TITLE, vec!["HTTP 500".into()])
    );

    h.session.cancel_edit(&id).unwrap();
    assert_eq!(h.session.phase(&id), Some(MessagePhase::Settled));
    assert!(!h.take_updates().contains(&SessionUpdate::RefetchRequested));
}

#[tokio::test]
async fn test_edit_rules_at_session_level() {
    let mut h = Harness::new();
    let _tx = h.connector.script("/s");
    let live = h.session.push(Message::machine_streaming("/s"));
    let error = h.session.push(Message::error(ErrorBlock::default()));

    assert_eq!(
        h.session.begin_edit(&live),
        Err(EditError::NotEditable(MessagePhase::Streaming))
    );
    assert_eq!(h.session.begin_edit(&error), Err(EditError::ErrorMessage));
    assert_eq!(
        h.session.begin_edit(&MessageId::from("missing")),
        Err(EditError::UnknownMessage("missing".into()))
    );
}

#[tokio::test]
async fn test_view_toggles_leave_message_untouched() {
    let mut h = Harness::new();
    let id = h.session.push(Message::machine("answer").with_thought("why"));
    let before = h.session.message(&id).unwrap().clone();
    h.take_updates();

    assert_eq!(h.session.toggle_thought(&id), Some(true));
    assert_eq!(h.session.toggle_prompt(&id), Some(true));
    assert_eq!(h.session.toggle_thought(&id), Some(false));

    assert_eq!(h.session.message(&id), Some(&before));
    assert!(h.take_updates().is_empty());
    assert_eq!(h.session.toggle_thought(&MessageId::from("nope")), None);
}
