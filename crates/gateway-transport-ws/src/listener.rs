//! TCP listener that accepts inbound WebSocket connections and spawns an
//! independent session task per connection (§4.5, §5: disjoint-endpoint
//! sessions are independent of one another).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gateway_core::crypto::NodeCryptoBackend;
use gateway_core::model::Certificate;
use gateway_core::store::ParcelStore;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use crate::session::{self, SessionDeps, STREAMING_MODE_CLOSE_UPON_COMPLETION, STREAMING_MODE_HEADER};

/// Binds a TCP port and accepts parcel collection sessions on it forever.
pub struct CollectionServer {
    listener: TokioTcpListener,
    parcel_store: Arc<dyn ParcelStore>,
    crypto: Arc<dyn NodeCryptoBackend>,
    trust_anchors: Vec<Certificate>,
}

impl CollectionServer {
    pub async fn bind(
        addr: SocketAddr,
        parcel_store: Arc<dyn ParcelStore>,
        crypto: Arc<dyn NodeCryptoBackend>,
        trust_anchors: Vec<Certificate>,
    ) -> std::io::Result<Self> {
        let listener = TokioTcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            parcel_store,
            crypto,
            trust_anchors,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the caller drops/aborts this future. Each
    /// accepted connection gets its own session task with a clone of the
    /// shared collaborators; a failure to accept is logged and does not
    /// bring the listener down.
    pub async fn serve(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            let parcel_store = self.parcel_store.clone();
            let crypto = self.crypto.clone();
            let trust_anchors = self.trust_anchors.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, parcel_store, crypto, trust_anchors).await {
                    tracing::debug!(%peer, error = %e, "connection ended before WebSocket upgrade");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    parcel_store: Arc<dyn ParcelStore>,
    crypto: Arc<dyn NodeCryptoBackend>,
    trust_anchors: Vec<Certificate>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let keep_alive_flag = Arc::new(AtomicBool::new(true));
    let keep_alive_for_callback = keep_alive_flag.clone();
    let header_callback = move |req: &Request, response: Response| {
        if let Some(value) = req.headers().get(STREAMING_MODE_HEADER) {
            if value.as_bytes() == STREAMING_MODE_CLOSE_UPON_COMPLETION.as_bytes() {
                keep_alive_for_callback.store(false, Ordering::SeqCst);
            }
        }
        Ok(response)
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, header_callback).await?;
    let keep_alive = keep_alive_flag.load(Ordering::SeqCst);
    let deps = SessionDeps {
        parcel_store,
        crypto,
        trust_anchors,
    };
    session::run_session(ws, deps, keep_alive).await;
    Ok(())
}
