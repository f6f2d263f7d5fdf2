//! Serializes courier sync stage events to a parent-process IPC stream and
//! the parent-side filter that turns them back into a status sequence
//! (§4.9).

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The three stages a courier sync run passes through, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierSyncStage {
    Collection,
    Wait,
    Delivery,
}

impl CourierSyncStage {
    /// The wire representation this crate writes and the parent-side
    /// filter recognizes (§4.9).
    pub fn wire_str(self) -> &'static str {
        match self {
            CourierSyncStage::Collection => "COLLECTION",
            CourierSyncStage::Wait => "WAIT",
            CourierSyncStage::Delivery => "DELIVERY",
        }
    }

    fn from_wire_str(raw: &str) -> Option<Self> {
        match raw {
            "COLLECTION" => Some(CourierSyncStage::Collection),
            "WAIT" => Some(CourierSyncStage::Wait),
            "DELIVERY" => Some(CourierSyncStage::Delivery),
            _ => None,
        }
    }
}

/// An IPC message read from or written to the parent process's stream. Only
/// `Stage` messages are ever produced by this crate; `Other` covers
/// whatever else a real subprocess might emit, which the parent passes
/// through silently (§4.9 last sentence). `stage` is carried as a raw
/// string, not [`CourierSyncStage`] itself, so a value this crate doesn't
/// recognize still deserializes as a `Stage` message rather than failing
/// the whole frame — [`filter_stages`] is what turns an unrecognized stage
/// into [`SyncStatus::Error`] (§8 S2).
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcMessage {
    Stage { stage: String },
    #[serde(other)]
    Other,
}

impl IpcMessage {
    pub fn stage(stage: CourierSyncStage) -> Self {
        IpcMessage::Stage {
            stage: stage.wire_str().to_owned(),
        }
    }
}

/// Anything that can observe a courier sync stage transition. The courier
/// sync driver (C8) calls this once per phase; [`LineIpcStageNotifier`] is
/// the production implementation a real subprocess uses to report each
/// transition to its parent over stdout, matching §6's IPC contract.
#[async_trait::async_trait]
pub trait StageNotifier: Send + Sync {
    async fn notify(&self, stage: CourierSyncStage);
}

/// Writes each stage transition as a line-framed JSON [`IpcMessage`] to
/// `W`, one line per notification. Errors writing to the sink are logged
/// and otherwise swallowed: a broken pipe to the parent process shouldn't
/// abort the sync itself, only its progress reporting.
pub struct LineIpcStageNotifier<W> {
    sink: tokio::sync::Mutex<W>,
}

impl<W> LineIpcStageNotifier<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(sink),
        }
    }
}

#[async_trait::async_trait]
impl<W> StageNotifier for LineIpcStageNotifier<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn notify(&self, stage: CourierSyncStage) {
        let message = IpcMessage::stage(stage);
        let mut line = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode stage IPC message");
                return;
            }
        };
        line.push(b'\n');

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.write_all(&line).await {
            tracing::warn!(error = %e, "failed to write stage IPC message");
            return;
        }
        if let Err(e) = sink.flush().await {
            tracing::warn!(error = %e, "failed to flush stage IPC message");
        }
    }
}

/// The UI-facing status values a consumer of the stage stream observes
/// (§8 S1/S2). `Complete` is synthesized once the stage stream ends
/// normally; any stage value outside [`CourierSyncStage`]'s three variants
/// yields [`SyncStatus::Error`] and ends the sequence immediately.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncStatus {
    CollectingCargo,
    Waiting,
    DeliveringCargo,
    Complete,
    Error,
}

impl From<CourierSyncStage> for SyncStatus {
    fn from(stage: CourierSyncStage) -> Self {
        match stage {
            CourierSyncStage::Collection => SyncStatus::CollectingCargo,
            CourierSyncStage::Wait => SyncStatus::Waiting,
            CourierSyncStage::Delivery => SyncStatus::DeliveringCargo,
        }
    }
}

/// The parent-side filter named in §4.9's last sentence: consume a raw
/// [`IpcMessage`] stream (as a real subprocess's stdout lines would
/// deserialize to), surface [`SyncStatus`] values, pass non-stage messages
/// through silently, and stop at the first unrecognized stage (§8 S2). The
/// empty-token precondition of §8 S3 is checked by
/// [`synchronize_with_courier`], one level up, before this stream is ever
/// constructed.
pub fn filter_stages(raw: impl Stream<Item = IpcMessage> + Send + 'static) -> impl Stream<Item = SyncStatus> {
    struct State<S> {
        stream: std::pin::Pin<Box<S>>,
        errored: bool,
        done: bool,
    }

    let state = State {
        stream: Box::pin(raw),
        errored: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            if state.errored {
                state.done = true;
                return None;
            }
            match state.stream.next().await {
                Some(IpcMessage::Stage { stage }) => match CourierSyncStage::from_wire_str(&stage) {
                    Some(stage) => return Some((SyncStatus::from(stage), state)),
                    None => {
                        state.errored = true;
                        return Some((SyncStatus::Error, state));
                    }
                },
                Some(IpcMessage::Other) => continue,
                None => {
                    state.done = true;
                    return Some((SyncStatus::Complete, state));
                }
            }
        }
    })
}

/// UI entry point (§8 S1/S3): reject an empty token before `raw_stages` is
/// ever touched, otherwise delegate to [`filter_stages`]. The token itself
/// is opaque here — whatever calls this with a real token has already
/// obtained it from wherever the UI's courier-sync trigger lives (out of
/// scope, §1); this only enforces the one precondition §8 names.
pub fn synchronize_with_courier(
    token: &str,
    raw_stages: impl Stream<Item = IpcMessage> + Send + 'static,
) -> BoxStream<'static, SyncStatus> {
    if token.is_empty() {
        return stream::once(async { SyncStatus::Error }).boxed();
    }
    filter_stages(raw_stages).boxed()
}
