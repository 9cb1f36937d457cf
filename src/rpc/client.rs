use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::domain::context::RequestContext;
use crate::domain::error::{ServiceError, ServiceResult};
use crate::rpc::frame_codec;
use crate::rpc::proto::{RpcReply, RpcRequest};

const MAX_IDLE_CONNECTIONS: usize = 32;

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// Client side of one backend service. Idle connections are pooled; a
/// connection that times out or errors is dropped rather than returned.
#[derive(Clone)]
pub struct RpcClient {
    service: &'static str,
    addr: String,
    idle: Arc<Mutex<Vec<Connection>>>,
}

impl RpcClient {
    pub fn new(service: &'static str, addr: impl Into<String>) -> Self {
        Self {
            service,
            addr: addr.into(),
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn call<Req, Resp>(
        &self,
        method: &str,
        request: Req,
        ctx: &RequestContext,
    ) -> ServiceResult<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let started = Instant::now();
        let remaining = ctx.remaining().ok_or(ServiceError::DeadlineExceeded)?;
        let envelope = RpcRequest {
            method: method.to_string(),
            request_id: ctx.request_id.clone(),
            timeout_ms: remaining.as_millis().max(1) as u64,
            payload: request.encode_to_vec(),
        };

        let result = match tokio::time::timeout(remaining, self.exchange(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::DeadlineExceeded),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(
                service = self.service,
                method,
                request_id = %ctx.request_id,
                elapsed_ms,
                "rpc call completed"
            ),
            Err(err) => tracing::debug!(
                service = self.service,
                method,
                request_id = %ctx.request_id,
                elapsed_ms,
                error = %err,
                "rpc call failed"
            ),
        }

        let payload = result?;
        Resp::decode(payload).map_err(|err| {
            tracing::error!(error = ?err, service = self.service, method, "failed to decode rpc reply");
            ServiceError::internal("malformed rpc reply")
        })
    }

    async fn exchange(&self, envelope: RpcRequest) -> ServiceResult<Bytes> {
        let request = Bytes::from(envelope.encode_to_vec());
        let (mut conn, pooled) = self.checkout().await?;

        // The server may have closed a pooled connection while it sat idle.
        // Retry once on a fresh one.
        let frame = match round_trip(&mut conn, request.clone()).await {
            Err(err) if pooled => {
                tracing::debug!(error = %err, service = self.service, "stale pooled rpc connection, reconnecting");
                conn = self.connect().await?;
                round_trip(&mut conn, request).await
            }
            other => other,
        }
        .map_err(|err| self.unavailable(err))?;

        let reply = RpcReply::decode(frame.freeze()).map_err(|err| {
            tracing::error!(error = ?err, service = self.service, "failed to decode rpc envelope");
            ServiceError::internal("malformed rpc reply")
        })?;

        self.checkin(conn).await;

        match reply.error {
            Some(err) => Err(err.into()),
            None => Ok(Bytes::from(reply.payload)),
        }
    }

    /// Returns an idle connection when one exists, flagged as pooled.
    async fn checkout(&self) -> ServiceResult<(Connection, bool)> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok((conn, true));
        }
        Ok((self.connect().await?, false))
    }

    async fn connect(&self) -> ServiceResult<Connection> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| self.unavailable(err))?;
        stream.set_nodelay(true).map_err(|err| self.unavailable(err))?;
        Ok(Framed::new(stream, frame_codec()))
    }

    async fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    fn unavailable(&self, err: io::Error) -> ServiceError {
        tracing::error!(error = ?err, service = self.service, addr = %self.addr, "rpc transport error");
        ServiceError::Unavailable(format!("{} service unavailable", self.service))
    }
}

/// Sends one request frame and waits for its reply frame.
async fn round_trip(conn: &mut Connection, request: Bytes) -> io::Result<BytesMut> {
    conn.send(request).await?;
    match conn.next().await {
        Some(frame) => frame,
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        )),
    }
}
