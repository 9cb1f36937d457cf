use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::Instrument;

use crate::domain::context::RequestContext;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::rpc::proto::{RpcError, RpcReply, RpcRequest};
use crate::rpc::{frame_codec, DEFAULT_TIMEOUT_MS};

/// A backend service reachable over the RPC transport.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs `method` against an encoded request and returns the encoded reply.
    async fn dispatch(&self, method: &str, payload: Bytes) -> ServiceResult<Vec<u8>>;
}

pub fn decode<M: Message + Default>(payload: Bytes) -> ServiceResult<M> {
    M::decode(payload).map_err(|err| {
        tracing::warn!(error = ?err, "failed to decode rpc payload");
        ServiceError::internal("malformed rpc payload")
    })
}

pub fn encode<M: Message>(message: M) -> ServiceResult<Vec<u8>> {
    Ok(message.encode_to_vec())
}

pub fn unknown_method(service: &str, method: &str) -> ServiceError {
    ServiceError::internal(format!("unknown method {}.{}", service, method))
}

/// Accepts connections until the listener fails or the task is dropped.
pub async fn serve(listener: TcpListener, service: Arc<dyn RpcService>) -> Result<()> {
    tracing::info!(
        service = service.name(),
        addr = %listener.local_addr()?,
        "rpc server listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, service.clone()).await {
                tracing::warn!(error = ?err, service = service.name(), peer = %peer, "rpc connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, service: Arc<dyn RpcService>) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, frame_codec());

    while let Some(frame) = framed.next().await {
        let request = RpcRequest::decode(frame?.freeze())?;
        let reply = handle_request(service.as_ref(), request).await;
        framed.send(Bytes::from(reply.encode_to_vec())).await?;
    }

    Ok(())
}

async fn handle_request(service: &dyn RpcService, request: RpcRequest) -> RpcReply {
    let timeout_ms = if request.timeout_ms == 0 {
        DEFAULT_TIMEOUT_MS
    } else {
        request.timeout_ms
    };
    let ctx = RequestContext::new(request.request_id, Duration::from_millis(timeout_ms));
    let span = tracing::info_span!(
        "rpc",
        service = service.name(),
        method = %request.method,
        request_id = %ctx.request_id,
    );

    let started = Instant::now();
    let outcome: ServiceResult<Vec<u8>> = async {
        let remaining = ctx.remaining().ok_or(ServiceError::DeadlineExceeded)?;
        tokio::time::timeout(
            remaining,
            service.dispatch(&request.method, Bytes::from(request.payload)),
        )
        .await
        .map_err(|_| ServiceError::DeadlineExceeded)?
    }
    .instrument(span.clone())
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let _entered = span.enter();
    match outcome {
        Ok(payload) => {
            tracing::info!(elapsed_ms, "rpc call completed");
            RpcReply {
                payload,
                error: None,
            }
        }
        Err(err) => {
            if matches!(err, ServiceError::Internal(_) | ServiceError::DeadlineExceeded) {
                tracing::warn!(elapsed_ms, error = %err, "rpc call failed");
            } else {
                tracing::info!(elapsed_ms, error = %err, "rpc call rejected");
            }
            RpcReply {
                payload: Vec::new(),
                error: Some(RpcError::from(&err)),
            }
        }
    }
}
