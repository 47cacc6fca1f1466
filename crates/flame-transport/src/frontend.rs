//! Service seam between the client and the wire.
//!
//! [`Frontend`] is the remote contract, one method per RPC. [`Connector`]
//! builds a `Frontend` for an endpoint. The gRPC implementations live here;
//! tests plug in stubs at either seam.

use std::sync::Arc;

use async_trait::async_trait;
use flame_core::{FlameError, context::DEFAULT_MAX_MESSAGE_SIZE};
use futures::{StreamExt, stream::BoxStream};
use tonic::{
    Response, Status,
    transport::{Channel, Endpoint},
};

use crate::protocol::{
    Application, CloseSessionRequest, CreateSessionRequest, CreateTaskRequest, FrontendClient,
    GetApplicationRequest, GetSessionRequest, GetTaskRequest, ListApplicationRequest,
    ListSessionRequest, RegisterApplicationRequest, Result as RpcResult, Session, Task,
    UnregisterApplicationRequest, WatchTaskRequest,
};

/// Stream of task snapshots returned by `WatchTask`.
pub type TaskStream = BoxStream<'static, Result<Task, Status>>;

/// The remote frontend service.
///
/// Implementations must be safe to call concurrently; one instance is shared
/// by every session of a connection.
#[async_trait]
pub trait Frontend: Send + Sync {
    async fn register_application(
        &self,
        req: RegisterApplicationRequest,
    ) -> Result<RpcResult, Status>;

    async fn unregister_application(
        &self,
        req: UnregisterApplicationRequest,
    ) -> Result<RpcResult, Status>;

    async fn get_application(&self, req: GetApplicationRequest) -> Result<Application, Status>;

    async fn list_application(
        &self,
        req: ListApplicationRequest,
    ) -> Result<Vec<Application>, Status>;

    async fn create_session(&self, req: CreateSessionRequest) -> Result<Session, Status>;

    async fn get_session(&self, req: GetSessionRequest) -> Result<Session, Status>;

    async fn close_session(&self, req: CloseSessionRequest) -> Result<Session, Status>;

    async fn list_session(&self, req: ListSessionRequest) -> Result<Vec<Session>, Status>;

    async fn create_task(&self, req: CreateTaskRequest) -> Result<Task, Status>;

    async fn get_task(&self, req: GetTaskRequest) -> Result<Task, Status>;

    /// Open a server stream of snapshots for one task.
    async fn watch_task(&self, req: WatchTaskRequest) -> Result<TaskStream, Status>;
}

/// Builds a [`Frontend`] for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a ready channel to `endpoint` (a normalized `scheme://host:port`).
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the endpoint cannot be reached.
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Frontend>, FlameError>;

    /// Largest payload the built frontends accept.
    fn max_message_size(&self) -> usize {
        DEFAULT_MAX_MESSAGE_SIZE
    }
}

/// [`Frontend`] backed by a tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcFrontend {
    client: FrontendClient<Channel>,
}

impl GrpcFrontend {
    /// Wrap a client stub.
    #[must_use]
    pub const fn new(client: FrontendClient<Channel>) -> Self {
        Self { client }
    }

    fn client(&self) -> FrontendClient<Channel> {
        self.client.clone()
    }
}

#[async_trait]
impl Frontend for GrpcFrontend {
    async fn register_application(
        &self,
        req: RegisterApplicationRequest,
    ) -> Result<RpcResult, Status> {
        self.client()
            .register_application(req)
            .await
            .map(Response::into_inner)
    }

    async fn unregister_application(
        &self,
        req: UnregisterApplicationRequest,
    ) -> Result<RpcResult, Status> {
        self.client()
            .unregister_application(req)
            .await
            .map(Response::into_inner)
    }

    async fn get_application(&self, req: GetApplicationRequest) -> Result<Application, Status> {
        self.client()
            .get_application(req)
            .await
            .map(Response::into_inner)
    }

    async fn list_application(
        &self,
        req: ListApplicationRequest,
    ) -> Result<Vec<Application>, Status> {
        let list = self.client().list_application(req).await?.into_inner();
        Ok(list.applications)
    }

    async fn create_session(&self, req: CreateSessionRequest) -> Result<Session, Status> {
        self.client()
            .create_session(req)
            .await
            .map(Response::into_inner)
    }

    async fn get_session(&self, req: GetSessionRequest) -> Result<Session, Status> {
        self.client()
            .get_session(req)
            .await
            .map(Response::into_inner)
    }

    async fn close_session(&self, req: CloseSessionRequest) -> Result<Session, Status> {
        self.client()
            .close_session(req)
            .await
            .map(Response::into_inner)
    }

    async fn list_session(&self, req: ListSessionRequest) -> Result<Vec<Session>, Status> {
        let list = self.client().list_session(req).await?.into_inner();
        Ok(list.sessions)
    }

    async fn create_task(&self, req: CreateTaskRequest) -> Result<Task, Status> {
        self.client()
            .create_task(req)
            .await
            .map(Response::into_inner)
    }

    async fn get_task(&self, req: GetTaskRequest) -> Result<Task, Status> {
        self.client().get_task(req).await.map(Response::into_inner)
    }

    async fn watch_task(&self, req: WatchTaskRequest) -> Result<TaskStream, Status> {
        let stream = self.client().watch_task(req).await?.into_inner();
        Ok(stream.boxed())
    }
}

/// [`Connector`] that dials the endpoint over HTTP/2.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    max_message_size: usize,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl GrpcConnector {
    /// Connector applying `max_message_size` to both directions.
    #[must_use]
    pub const fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl From<&flame_core::FlameContext> for GrpcConnector {
    fn from(ctx: &flame_core::FlameContext) -> Self {
        Self::new(ctx.max_message_size)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Frontend>, FlameError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| FlameError::InvalidConfig(format!("invalid address <{endpoint}>: {e}")))?
            .connect()
            .await
            .map_err(|e| {
                FlameError::InvalidConfig(format!("failed to connect to <{endpoint}>: {e}"))
            })?;

        tracing::debug!("Connected to flame frontend at <{endpoint}>");

        let client = FrontendClient::new(channel)
            .max_decoding_message_size(self.max_message_size)
            .max_encoding_message_size(self.max_message_size);

        Ok(Arc::new(GrpcFrontend::new(client)))
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}
