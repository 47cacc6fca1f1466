//! Connection to the Flame frontend service.

use std::{fmt, sync::Arc};

use flame_core::{
    Application, ApplicationAttributes, FlameError, Result, SessionAttributes, SessionInfo,
};
use flame_transport::{
    Connector, Frontend, GrpcConnector,
    protocol::{
        self as rpc, CloseSessionRequest, CreateSessionRequest, GetApplicationRequest,
        GetSessionRequest, ListApplicationRequest, ListSessionRequest,
        RegisterApplicationRequest, UnregisterApplicationRequest,
    },
};
use http::Uri;
use tokio::sync::watch;
use tonic::Status;

use crate::session::Session;

/// Port used when the address does not name one.
pub const DEFAULT_PORT: u16 = 8080;

/// Map a failed RPC to `Internal`, keeping the remote detail.
pub(crate) fn rpc_error(operation: &'static str) -> impl FnOnce(Status) -> FlameError {
    move |status| {
        FlameError::Internal(format!(
            "failed to {operation}: {} ({:?})",
            status.message(),
            status.code()
        ))
    }
}

fn check_result(result: &rpc::Result, operation: &str) -> Result<()> {
    if result.return_code < 0 {
        return Err(FlameError::Internal(format!(
            "failed to {operation}: {}",
            result.message.as_deref().unwrap_or("rejected by service")
        )));
    }
    Ok(())
}

/// Normalize an address to `scheme://host:port`.
///
/// The scheme defaults to `http` and the port to [`DEFAULT_PORT`].
///
/// # Errors
/// Returns `InvalidConfig` if the address is empty, unparsable, or names no host.
pub fn normalize_address(addr: &str) -> Result<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(FlameError::InvalidConfig(
            "address cannot be empty".to_string(),
        ));
    }

    let uri: Uri = addr
        .parse()
        .map_err(|e| FlameError::InvalidConfig(format!("invalid address <{addr}>: {e}")))?;
    let host = uri
        .host()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| FlameError::InvalidConfig(format!("no host in address <{addr}>")))?;
    let scheme = uri.scheme_str().unwrap_or("http");
    let port = uri.port_u16().unwrap_or(DEFAULT_PORT);

    Ok(format!("{scheme}://{host}:{port}"))
}

struct Inner {
    endpoint: String,
    frontend: Arc<dyn Frontend>,
    closed: watch::Sender<bool>,
    max_message_size: usize,
}

/// A shared channel to the frontend service.
///
/// Cloning is cheap and every clone refers to the same channel; the channel
/// multiplexes concurrent calls from any number of sessions.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect to `addr` over gRPC.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the address is malformed or the endpoint
    /// cannot be reached.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with(addr, &GrpcConnector::default()).await
    }

    /// Connect to `addr` through `connector`.
    ///
    /// The address is validated before the connector is called.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the address is malformed or the connector
    /// fails.
    pub async fn connect_with(addr: &str, connector: &dyn Connector) -> Result<Self> {
        let endpoint = normalize_address(addr)?;
        let frontend = connector.connect(&endpoint).await?;

        tracing::debug!("Connection to <{endpoint}> established");

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                frontend,
                closed: watch::channel(false).0,
                max_message_size: connector.max_message_size(),
            }),
        })
    }

    /// Normalized endpoint of this connection.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Largest payload accepted for task input and common data.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.inner.max_message_size
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Whether `other` shares this connection's channel.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Close the connection.
    ///
    /// Outstanding task watchers fail on their next pull and every further
    /// call returns `InvalidState`. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.inner.closed.send_replace(true) {
            tracing::debug!("Connection to <{}> closed", self.inner.endpoint);
        }
    }

    pub(crate) fn frontend(&self) -> Result<&dyn Frontend> {
        if self.is_closed() {
            return Err(FlameError::InvalidState(format!(
                "connection to <{}> is closed",
                self.inner.endpoint
            )));
        }
        Ok(self.inner.frontend.as_ref())
    }

    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    pub(crate) fn check_payload(&self, what: &str, len: usize) -> Result<()> {
        if len > self.inner.max_message_size {
            return Err(FlameError::InvalidArgument(format!(
                "{what} is {len} bytes, larger than the limit of {} bytes",
                self.inner.max_message_size
            )));
        }
        Ok(())
    }

    /// Register an application under `name`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty name and `Internal` if the
    /// service fails or rejects the registration.
    pub async fn register_application(
        &self,
        name: &str,
        attrs: &ApplicationAttributes,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(FlameError::InvalidArgument(
                "application name cannot be empty".to_string(),
            ));
        }

        let result = self
            .frontend()?
            .register_application(RegisterApplicationRequest {
                name: name.to_string(),
                application: Some(attrs.into()),
            })
            .await
            .map_err(rpc_error("register application"))?;
        check_result(&result, "register application")?;

        tracing::debug!("Application <{name}> registered");
        Ok(())
    }

    /// Remove the application registered under `name`.
    ///
    /// # Errors
    /// Returns `Internal` if the service fails or rejects the request.
    pub async fn unregister_application(&self, name: &str) -> Result<()> {
        let result = self
            .frontend()?
            .unregister_application(UnregisterApplicationRequest {
                name: name.to_string(),
            })
            .await
            .map_err(rpc_error("unregister application"))?;
        check_result(&result, "unregister application")?;

        tracing::debug!("Application <{name}> unregistered");
        Ok(())
    }

    /// # Errors
    /// Returns `Internal` if the service fails or the application is unknown.
    pub async fn get_application(&self, name: &str) -> Result<Application> {
        let app = self
            .frontend()?
            .get_application(GetApplicationRequest {
                name: name.to_string(),
            })
            .await
            .map_err(rpc_error("get application"))?;
        Application::try_from(app)
    }

    /// # Errors
    /// Returns `Internal` if the service fails.
    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        self.frontend()?
            .list_application(ListApplicationRequest {})
            .await
            .map_err(rpc_error("list applications"))?
            .into_iter()
            .map(Application::try_from)
            .collect()
    }

    /// Open a session bound to this connection.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty application, non-positive slots
    /// or oversize common data, and `Internal` if the service fails.
    pub async fn create_session(&self, attrs: &SessionAttributes) -> Result<Session> {
        if attrs.application.is_empty() {
            return Err(FlameError::InvalidArgument(
                "application name cannot be empty".to_string(),
            ));
        }
        if attrs.slots <= 0 {
            return Err(FlameError::InvalidArgument(format!(
                "slots must be positive, got {}",
                attrs.slots
            )));
        }
        if let Some(data) = &attrs.common_data {
            self.check_payload("common data", data.len())?;
        }

        let ssn = self
            .frontend()?
            .create_session(CreateSessionRequest {
                session: Some(attrs.into()),
            })
            .await
            .map_err(rpc_error("create session"))?;
        let info = SessionInfo::try_from(ssn)?;

        tracing::debug!(
            "Session <{}> created for application <{}>",
            info.id,
            info.application
        );
        Ok(Session::new(self.clone(), info))
    }

    /// Look up a session by id.
    ///
    /// # Errors
    /// Returns `Internal` if the service fails or the session is unknown.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        let info = self.session_info(id).await?;
        Ok(Session::new(self.clone(), info))
    }

    pub(crate) async fn session_info(&self, id: &str) -> Result<SessionInfo> {
        let ssn = self
            .frontend()?
            .get_session(GetSessionRequest {
                session_id: id.to_string(),
            })
            .await
            .map_err(rpc_error("get session"))?;
        SessionInfo::try_from(ssn)
    }

    /// # Errors
    /// Returns `Internal` if the service fails.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.frontend()?
            .list_session(ListSessionRequest {})
            .await
            .map_err(rpc_error("list sessions"))?
            .into_iter()
            .map(SessionInfo::try_from)
            .collect()
    }

    /// Close a session and return its final snapshot.
    ///
    /// Closing an already closed session returns the same closed snapshot.
    ///
    /// # Errors
    /// Returns `Internal` if the service fails or the session is unknown.
    pub async fn close_session(&self, id: &str) -> Result<SessionInfo> {
        let ssn = self
            .frontend()?
            .close_session(CloseSessionRequest {
                session_id: id.to_string(),
            })
            .await
            .map_err(rpc_error("close session"))?;
        let info = SessionInfo::try_from(ssn)?;

        tracing::debug!(
            "Session <{id}> closed: {} succeed, {} failed",
            info.succeed,
            info.failed
        );
        Ok(info)
    }
}

/// Connect to `addr` over gRPC.
///
/// # Errors
/// See [`Connection::connect`].
pub async fn connect(addr: &str) -> Result<Connection> {
    Connection::connect(addr).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use flame_core::{ErrorCode, SessionState, Shim};
    use flame_transport::MemoryFrontend;
    use tokio_test::assert_ok;

    use super::*;

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
        frontend: MemoryFrontend,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Frontend>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.frontend.connect(endpoint).await
        }
    }

    async fn echo_connection() -> Connection {
        Connection::connect_with("127.0.0.1", &MemoryFrontend::echo())
            .await
            .unwrap()
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("127.0.0.1").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            normalize_address("localhost:7000").unwrap(),
            "http://localhost:7000"
        );
        assert_eq!(
            normalize_address(" https://flame.example.com:9090/ ").unwrap(),
            "https://flame.example.com:9090"
        );
        assert_eq!(
            normalize_address("   ").unwrap_err().code(),
            ErrorCode::InvalidConfig
        );
    }

    #[tokio::test]
    async fn test_empty_address_never_reaches_connector() {
        let connector = CountingConnector::default();

        let err = Connection::connect_with("", &connector).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_session_against_echo() {
        let conn = echo_connection().await;

        let ssn = conn
            .create_session(&SessionAttributes::new("echo", 1))
            .await
            .unwrap();

        assert!(!ssn.id().is_empty());
        assert_eq!(ssn.state(), SessionState::Open);
        assert_eq!(ssn.info().pending, 0);
        assert_eq!(ssn.info().total_tasks(), 0);
    }

    #[tokio::test]
    async fn test_create_session_validates_locally() {
        let connector = CountingConnector::default();
        let conn = Connection::connect_with("127.0.0.1", &connector)
            .await
            .unwrap();

        let err = conn
            .create_session(&SessionAttributes::new("echo", 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = conn
            .create_session(&SessionAttributes::new("", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let oversize = Bytes::from(vec![0_u8; conn.max_message_size() + 1]);
        let err = conn
            .create_session(&SessionAttributes::new("echo", 1).with_common_data(oversize))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unknown_application_is_internal() {
        let conn = echo_connection().await;

        let err = conn
            .create_session(&SessionAttributes::new("missing", 1))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.message().starts_with("failed to create session"));
    }

    #[tokio::test]
    async fn test_application_lifecycle() {
        let conn = echo_connection().await;
        let attrs = ApplicationAttributes::new(Shim::Shell).with_command("/bin/cat");

        assert_ok!(conn.register_application("cat", &attrs).await);

        let app = conn.get_application("cat").await.unwrap();
        assert_eq!(app.name, "cat");
        assert_eq!(app.attributes.command.as_deref(), Some("/bin/cat"));

        let names: Vec<String> = conn
            .list_applications()
            .await
            .unwrap()
            .into_iter()
            .map(|app| app.name)
            .collect();
        assert_eq!(names, vec!["cat", "echo"]);

        let err = conn.register_application("cat", &attrs).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);

        assert_ok!(conn.unregister_application("cat").await);
        assert!(conn.get_application("cat").await.is_err());
    }

    #[tokio::test]
    async fn test_close_session_is_idempotent() {
        let conn = echo_connection().await;
        let ssn = conn
            .create_session(&SessionAttributes::new("echo", 1))
            .await
            .unwrap();

        let first = conn.close_session(ssn.id()).await.unwrap();
        assert_eq!(first.state, SessionState::Closed);
        assert!(first.completion_time.is_some());

        let second = conn.close_session(ssn.id()).await.unwrap();
        assert_eq!(second.state, SessionState::Closed);
        assert_eq!(second.completion_time, first.completion_time);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_calls() {
        let conn = echo_connection().await;
        let other = conn.clone();

        conn.close();
        conn.close();

        assert!(other.is_closed());
        let err = other.list_sessions().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }
}
