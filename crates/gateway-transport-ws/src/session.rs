//! The parcel collection server's session state machine (§4.5).
//!
//! After a successful handshake, the delivery direction (server → client)
//! and the acknowledgement direction (client → server) run as two
//! `tokio::spawn`ed cooperative tasks sharing a [`CollectionTracker`] behind
//! a `tokio::sync::Mutex`, matching §5's guidance for an implementation
//! that uses parallel tasks rather than a single select loop. Whichever
//! side first observes a terminal condition — completion, or an unknown
//! ACK — reports it over a channel; the session's owning task sends the
//! corresponding close frame and tears down both subtasks.

use std::sync::Arc;

use futures_util::stream::{BoxStream, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gateway_core::crypto::NodeCryptoBackend;
use gateway_core::model::{Certificate, ParcelDirection, PrivateAddress};
use gateway_core::store::ParcelStore;
use gateway_switch::handshake::{self, HandshakeChallenge, HandshakeResponse};
use gateway_switch::tracker::CollectionTracker;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::wire::ParcelDelivery;

/// Request header selecting "close-upon-completion" mode (§4.5, §6). Only
/// this literal value means "don't keep alive" — anything else, including
/// the header's absence, means keep-alive. This is a string match, never a
/// parsed boolean (§9 design notes).
pub const STREAMING_MODE_HEADER: &str = "x-relaynet-streaming-mode";
pub const STREAMING_MODE_CLOSE_UPON_COMPLETION: &str = "close-upon-completion";

/// Collaborators a session needs beyond the WebSocket connection itself.
pub struct SessionDeps {
    pub parcel_store: Arc<dyn ParcelStore>,
    pub crypto: Arc<dyn NodeCryptoBackend>,
    /// Trust anchors the handshake response is verified against: this
    /// gateway's own certificates (§4.4 step 3).
    pub trust_anchors: Vec<Certificate>,
}

#[derive(Debug)]
enum SessionOutcome {
    Normal,
    CannotAccept(String),
}

impl SessionOutcome {
    fn into_close_frame(self) -> CloseFrame<'static> {
        match self {
            SessionOutcome::Normal => CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            },
            SessionOutcome::CannotAccept(reason) => CloseFrame {
                code: CloseCode::Policy,
                reason: reason.into(),
            },
        }
    }
}

/// Run one collection session to completion. Returns once the connection is
/// closed, either by us (completion or unknown-ACK) or by the peer.
pub async fn run_session<S>(mut ws: WebSocketStream<S>, deps: SessionDeps, keep_alive: bool)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let endpoint_addresses =
        match perform_handshake(&mut ws, deps.crypto.as_ref(), &deps.trust_anchors).await {
            Ok(addresses) => addresses,
            Err(outcome) => {
                tracing::info!("handshake failed, closing session");
                send_close(&mut ws, outcome).await;
                return;
            }
        };
    tracing::info!(
        endpoint_count = endpoint_addresses.len(),
        keep_alive,
        "handshake accepted, streaming parcels"
    );

    let (write, read) = ws.split();
    let write = Arc::new(AsyncMutex::new(write));
    let tracker = Arc::new(AsyncMutex::new(CollectionTracker::new()));
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<SessionOutcome>(2);

    let delivery_handle = tokio::spawn(delivery_loop(
        deps.parcel_store.clone(),
        endpoint_addresses,
        keep_alive,
        write.clone(),
        tracker.clone(),
        outcome_tx.clone(),
    ));
    let ack_handle = tokio::spawn(ack_loop(deps.parcel_store, read, tracker, outcome_tx));

    if let Some(outcome) = outcome_rx.recv().await {
        let close = Message::Close(Some(outcome.into_close_frame()));
        let mut sink = write.lock().await;
        let _ = sink.send(close).await;
        let _ = sink.flush().await;
    }
    delivery_handle.abort();
    ack_handle.abort();
}

async fn perform_handshake<S>(
    ws: &mut WebSocketStream<S>,
    crypto: &dyn NodeCryptoBackend,
    trust_anchors: &[Certificate],
) -> Result<Vec<PrivateAddress>, SessionOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nonce = handshake::generate_nonce();
    let challenge = HandshakeChallenge { nonce: nonce.clone() };
    let challenge_bytes =
        serde_json::to_vec(&challenge).expect("HandshakeChallenge always serializes");
    if ws.send(Message::Binary(challenge_bytes)).await.is_err() {
        return Err(SessionOutcome::CannotAccept(
            "failed to send handshake challenge".into(),
        ));
    }

    let frame = match ws.next().await {
        Some(Ok(Message::Binary(bytes))) => bytes,
        _ => {
            return Err(SessionOutcome::CannotAccept(
                "malformed handshake response frame".into(),
            ))
        }
    };
    let response: HandshakeResponse = serde_json::from_slice(&frame).map_err(|e| {
        SessionOutcome::CannotAccept(format!("malformed handshake response frame: {e}"))
    })?;

    handshake::verify_response(&nonce, &response, crypto, trust_anchors)
        .await
        .map_err(|e| SessionOutcome::CannotAccept(e.close_reason()))
}

async fn send_close<S>(ws: &mut WebSocketStream<S>, outcome: SessionOutcome)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ws
        .send(Message::Close(Some(outcome.into_close_frame())))
        .await;
    let _ = ws.flush().await;
}

type Sink<S> = Arc<AsyncMutex<SplitSink<WebSocketStream<S>, Message>>>;

/// Server → client direction: subscribe to the store, mint a delivery-ID
/// per parcel, track it, and send it. Enumeration order is preserved for
/// send (§5); any raced-deletion skip is silent (§4.5 edge cases).
async fn delivery_loop<S>(
    parcel_store: Arc<dyn ParcelStore>,
    endpoint_addresses: Vec<PrivateAddress>,
    keep_alive: bool,
    write: Sink<S>,
    tracker: Arc<AsyncMutex<CollectionTracker>>,
    outcome_tx: mpsc::Sender<SessionOutcome>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut keys = parcel_store.stream_active_bound_for_endpoints(endpoint_addresses, keep_alive);
    while let Some(key) = keys.next().await {
        let bytes = match parcel_store
            .retrieve(&key, ParcelDirection::FromInternetToEndpoint)
            .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(%key, "parcel raced deletion before send, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to retrieve parcel, skipping");
                continue;
            }
        };

        let delivery_id = Uuid::new_v4();
        tracker.lock().await.add_pending_ack(delivery_id, key);

        let delivery = ParcelDelivery {
            delivery_id: delivery_id.to_string(),
            parcel_serialized: bytes,
        };
        let frame = match serde_json::to_vec(&delivery) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode parcel delivery, skipping");
                continue;
            }
        };
        if write.lock().await.send(Message::Binary(frame)).await.is_err() {
            tracing::debug!("transport closed mid-delivery, stopping delivery loop");
            return;
        }
    }

    let mut guard = tracker.lock().await;
    guard.mark_all_parcels_delivered();
    if guard.is_complete() {
        let _ = outcome_tx.send(SessionOutcome::Normal).await;
    }
}

/// Client → server direction: every inbound text frame is a raw delivery-ID
/// ACK. An ID this session never issued terminates the session (§4.5).
async fn ack_loop<S>(
    parcel_store: Arc<dyn ParcelStore>,
    mut read: SplitStream<WebSocketStream<S>>,
    tracker: Arc<AsyncMutex<CollectionTracker>>,
    outcome_tx: mpsc::Sender<SessionOutcome>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => return,
        };
        let raw_delivery_id = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };

        let delivery_id = match raw_delivery_id.parse::<Uuid>() {
            Ok(id) => id,
            Err(_) => {
                let _ = outcome_tx
                    .send(SessionOutcome::CannotAccept(format!(
                        "Unknown delivery id: {raw_delivery_id}"
                    )))
                    .await;
                return;
            }
        };

        let popped = tracker.lock().await.pop_pending_parcel_key(delivery_id);
        let parcel_key = match popped {
            Some(key) => key,
            None => {
                let _ = outcome_tx
                    .send(SessionOutcome::CannotAccept(format!(
                        "Unknown delivery id: {delivery_id}"
                    )))
                    .await;
                return;
            }
        };

        let ack_info = match parcel_store.collection_ack_info(&parcel_key).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(%parcel_key, error = %e, "failed to look up PCA info for acknowledged parcel");
                None
            }
        };

        if let Err(e) = parcel_store
            .delete(&parcel_key, ParcelDirection::FromInternetToEndpoint)
            .await
        {
            tracing::warn!(%parcel_key, error = %e, "failed to delete acknowledged parcel");
        }

        if let Some((ack, expiry_date)) = ack_info {
            if let Err(e) = parcel_store.record_collection_ack(ack, expiry_date).await {
                tracing::warn!(%parcel_key, error = %e, "failed to record PCA for acknowledged parcel");
            }
        }

        if tracker.lock().await.is_complete() {
            let _ = outcome_tx.send(SessionOutcome::Normal).await;
            return;
        }
    }
}
