//! Per-connection session: handshake state, descriptors, dispatch.
//!
//! ```text
//! AwaitingHello ──HELLO──► Ready ──GOODBYE──► Closed
//!       ▲   │ other: ERROR   │ HELLO: restart
//!       └───┘                └──────┘
//! ```

use bytes::Bytes;
use chrono::Local;

use crate::codec::{DecodeError, Request, Response};
use crate::error::{ErrorCode, RequestError};
use crate::protocol::{msg_type, Frame, PROTOCOL_MAGIC, PROTOCOL_VERSION, SESSION_ID};
use crate::server::ServerConfig;
use crate::storage::{DescriptorTable, StorageRoot};

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Only HELLO is accepted.
    AwaitingHello,
    /// Handshake done; all requests are routed.
    Ready,
    /// GOODBYE received; the loop must stop.
    Closed,
}

/// State owned by one client connection.
pub struct Session {
    state: SessionState,
    table: DescriptorTable,
    root: StorageRoot,
    adapter_name: String,
    last_error: Option<RequestError>,
}

impl Session {
    /// Create a session awaiting HELLO.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: SessionState::AwaitingHello,
            table: DescriptorTable::new(config.max_descriptors, config.allow_writes),
            root: StorageRoot::new(config.storage_root.clone()),
            adapter_name: config.adapter_name.clone(),
            last_error: None,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// The session's descriptor table.
    pub fn descriptors(&self) -> &DescriptorTable {
        &self.table
    }

    /// The last error reported to the client.
    pub fn last_error(&self) -> Option<&RequestError> {
        self.last_error.as_ref()
    }

    /// Handle one request frame, returning the response to send, if any.
    pub async fn handle_frame(&mut self, frame: &Frame) -> Option<Response> {
        if self.state == SessionState::Closed {
            return None;
        }

        if self.state == SessionState::AwaitingHello && frame.msg_type() != msg_type::HELLO {
            tracing::warn!(msg_type = frame.type_name(), "request before HELLO");
            return Some(self.reject(RequestError::new(
                ErrorCode::PermissionDenied,
                format!("{} before HELLO: session not started", frame.type_name()),
            )));
        }

        match Request::decode(frame.msg_type(), frame.body.clone()) {
            Ok(request) => self.handle(request).await,
            Err(DecodeError::UnknownType(t)) => Some(self.reject(RequestError::not_supported(
                format!("message type {:#04x} not supported", t),
            ))),
            Err(e) => Some(self.reject(RequestError::invalid_argument(e.to_string()))),
        }
    }

    /// Route a decoded request to its handler.
    ///
    /// FILE-CLOSE and GOODBYE are never answered.
    pub async fn handle(&mut self, request: Request) -> Option<Response> {
        tracing::debug!(?request, "dispatch");

        let result = match request {
            Request::Hello {
                magic,
                version,
                options,
            } => self.hello(magic, version, options),
            Request::StorageOpen {
                descriptor,
                flags,
                url,
            } => self.storage_open(descriptor, flags, &url).await,
            Request::StorageGet {
                descriptor,
                offset,
                length,
            } => self
                .table
                .read_at(descriptor, offset as u64, length as usize)
                .await
                .map(data_buffer),
            Request::StoragePut {
                descriptor,
                offset,
                data,
            } => self
                .table
                .write_at(descriptor, offset as u64, &data)
                .await
                .map(|()| Response::Ok),
            Request::GetDateTime => Ok(Response::date_time(Local::now().naive_local())),
            Request::FileClose { descriptor } => {
                self.table.close(descriptor);
                return None;
            }
            Request::GetErrorDetails { code, max_length } => {
                Ok(self.error_details(code, max_length))
            }
            Request::GetBlock {
                descriptor,
                block_index,
                block_length,
            } => self
                .table
                .get_block(descriptor, block_index, block_length)
                .await
                .map(data_buffer),
            Request::PutBlock {
                descriptor,
                block_index,
                block_length,
                data,
            } => self
                .table
                .put_block(descriptor, block_index, block_length, &data)
                .await
                .map(|()| Response::Ok),
            Request::Goodbye => {
                let released = self.close();
                tracing::info!(released, "client said goodbye");
                return None;
            }
        };

        Some(match result {
            Ok(response) => response,
            Err(err) => self.reject(err),
        })
    }

    fn hello(
        &mut self,
        magic: [u8; 3],
        version: u16,
        options: u16,
    ) -> Result<Response, RequestError> {
        if magic != PROTOCOL_MAGIC {
            return Err(RequestError::invalid_argument(format!(
                "bad HELLO magic {:02x?}",
                magic
            )));
        }
        if version > PROTOCOL_VERSION {
            return Err(RequestError::not_supported(format!(
                "protocol version {:#06x} not supported",
                version
            )));
        }

        if self.state == SessionState::Ready {
            let released = self.table.close_all();
            tracing::info!(released, "session restarted by HELLO");
        }

        self.state = SessionState::Ready;
        self.last_error = None;
        tracing::info!(version, options, "session started");

        Ok(Response::SessionStarted {
            session_id: SESSION_ID,
            version: PROTOCOL_VERSION,
            adapter_name: self.adapter_name.clone(),
        })
    }

    async fn storage_open(
        &mut self,
        hint: u8,
        flags: u16,
        url: &[u8],
    ) -> Result<Response, RequestError> {
        let path = self.root.resolve(url)?;
        let url = String::from_utf8_lossy(url);
        let (descriptor, length) = self.table.open(hint, flags, &path).await?;

        let Ok(length) = u32::try_from(length) else {
            self.table.close(descriptor);
            return Err(RequestError::new(
                ErrorCode::FileTooBig,
                format!("{}: larger than 4 GiB", url),
            ));
        };

        tracing::info!(descriptor, url = %url, length, "storage loaded");
        Ok(Response::StorageLoaded { descriptor, length })
    }

    fn error_details(&self, code: u16, max_length: u8) -> Response {
        let mut message = match &self.last_error {
            Some(err) if err.code.as_u16() == code => err.message.clone(),
            _ => ErrorCode::from_u16(code)
                .map(ErrorCode::default_message)
                .unwrap_or("unknown error")
                .to_string(),
        };

        let mut end = message.len().min(max_length as usize);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);

        Response::Error { code, message }
    }

    /// Record `err` as the last error and build its ERROR response.
    fn reject(&mut self, err: RequestError) -> Response {
        tracing::debug!(code = err.code.as_u16(), message = %err.message, "request failed");
        let response = Response::error(&err);
        self.last_error = Some(err);
        response
    }

    /// Release every descriptor and mark the session closed.
    ///
    /// Returns how many descriptors were still open.
    pub fn close(&mut self) -> usize {
        self.state = SessionState::Closed;
        self.table.close_all()
    }
}

fn data_buffer(data: Bytes) -> Response {
    Response::DataBuffer { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestHeader;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("disk.img"), (0..=255u8).collect::<Vec<_>>()).unwrap();
        let config = ServerConfig {
            storage_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let session = Session::new(&config);
        (dir, session)
    }

    fn frame(request: &Request) -> Frame {
        let body = request.encode_body();
        Frame::new(
            RequestHeader::new(SESSION_ID, (body.len() + 1) as u16),
            request.msg_type(),
            body,
        )
    }

    fn hello() -> Request {
        Request::Hello {
            magic: *b"ACP",
            version: 1,
            options: 0,
        }
    }

    fn open(url: &str) -> Request {
        Request::StorageOpen {
            descriptor: 0,
            flags: 0,
            url: Bytes::copy_from_slice(url.as_bytes()),
        }
    }

    fn error_code(response: Option<Response>) -> u16 {
        match response {
            Some(Response::Error { code, .. }) => code,
            other => panic!("expected ERROR, got {:?}", other),
        }
    }

    async fn started() -> (TempDir, Session) {
        let (dir, mut session) = setup();
        session.handle_frame(&frame(&hello())).await.unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn test_hello_starts_session() {
        let (_dir, mut session) = setup();
        assert_eq!(session.state(), SessionState::AwaitingHello);

        let response = session.handle_frame(&frame(&hello())).await;

        assert_eq!(
            response,
            Some(Response::SessionStarted {
                session_id: 0,
                version: 1,
                adapter_name: "NABU-ADAPTOR-1.1".to_string()
            })
        );
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_requests_before_hello_rejected() {
        let (_dir, mut session) = setup();

        let response = session.handle_frame(&frame(&open("disk.img"))).await;
        assert_eq!(error_code(response), ErrorCode::PermissionDenied.as_u16());
        assert_eq!(session.state(), SessionState::AwaitingHello);

        let response = session.handle_frame(&frame(&Request::Goodbye)).await;
        assert_eq!(error_code(response), ErrorCode::PermissionDenied.as_u16());
        assert_eq!(session.state(), SessionState::AwaitingHello);

        // The client may retry the handshake.
        let response = session.handle_frame(&frame(&hello())).await;
        assert!(matches!(response, Some(Response::SessionStarted { .. })));
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let (_dir, mut session) = setup();
        let bad = Request::Hello {
            magic: *b"NOP",
            version: 1,
            options: 0,
        };

        let response = session.handle_frame(&frame(&bad)).await;

        assert_eq!(error_code(response), ErrorCode::InvalidArgument.as_u16());
        assert_eq!(session.state(), SessionState::AwaitingHello);
    }

    #[tokio::test]
    async fn test_future_version_rejected() {
        let (_dir, mut session) = setup();
        let future = Request::Hello {
            magic: *b"ACP",
            version: 2,
            options: 0,
        };

        let response = session.handle_frame(&frame(&future)).await;

        assert_eq!(error_code(response), ErrorCode::NotSupported.as_u16());
        assert_eq!(session.state(), SessionState::AwaitingHello);
    }

    #[tokio::test]
    async fn test_open_and_read_block() {
        let (_dir, mut session) = started().await;

        let response = session.handle_frame(&frame(&open("disk.img"))).await;
        assert_eq!(
            response,
            Some(Response::StorageLoaded {
                descriptor: 0,
                length: 256
            })
        );

        let get = Request::GetBlock {
            descriptor: 0,
            block_index: 1,
            block_length: 128,
        };
        match session.handle_frame(&frame(&get)).await {
            Some(Response::DataBuffer { data }) => {
                assert_eq!(data.len(), 128);
                assert_eq!(data[0], 128);
                assert_eq!(data[127], 255);
            }
            other => panic!("expected DATA-BUFFER, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_storage_get_byte_range() {
        let (_dir, mut session) = started().await;
        session.handle_frame(&frame(&open("disk.img"))).await;

        let get = Request::StorageGet {
            descriptor: 0,
            offset: 250,
            length: 10,
        };
        let response = session.handle_frame(&frame(&get)).await;

        assert_eq!(
            response,
            Some(Response::DataBuffer {
                data: Bytes::from_static(&[250, 251, 252, 253, 254, 255])
            })
        );
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_dir, mut session) = started().await;

        let response = session.handle_frame(&frame(&open("nope.img"))).await;

        assert_eq!(error_code(response), ErrorCode::NotFound.as_u16());
        assert_eq!(session.descriptors().open_count(), 0);
    }

    #[tokio::test]
    async fn test_open_escaping_root_denied() {
        let (_dir, mut session) = started().await;

        let response = session.handle_frame(&frame(&open("../disk.img"))).await;

        assert_eq!(error_code(response), ErrorCode::AccessDenied.as_u16());
    }

    #[tokio::test]
    async fn test_put_block_not_supported() {
        let (dir, mut session) = started().await;
        session.handle_frame(&frame(&open("disk.img"))).await;

        let put = Request::PutBlock {
            descriptor: 0,
            block_index: 0,
            block_length: 2,
            data: Bytes::from_static(b"zz"),
        };
        let response = session.handle_frame(&frame(&put)).await;

        assert_eq!(error_code(response), ErrorCode::NotSupported.as_u16());
        let contents = std::fs::read(dir.path().join("disk.img")).unwrap();
        assert_eq!(&contents[..2], &[0, 1]);
    }

    #[tokio::test]
    async fn test_file_close_has_no_response() {
        let (_dir, mut session) = started().await;
        session.handle_frame(&frame(&open("disk.img"))).await;
        assert!(session.descriptors().is_open(0));

        let response = session
            .handle_frame(&frame(&Request::FileClose { descriptor: 0 }))
            .await;
        assert!(response.is_none());
        assert!(!session.descriptors().is_open(0));

        let get = Request::GetBlock {
            descriptor: 0,
            block_index: 0,
            block_length: 16,
        };
        let response = session.handle_frame(&frame(&get)).await;
        assert_eq!(error_code(response), ErrorCode::BadDescriptor.as_u16());

        // Double close stays silent.
        let response = session
            .handle_frame(&frame(&Request::FileClose { descriptor: 0 }))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_type_not_supported() {
        let (_dir, mut session) = started().await;
        let list_dir = Frame::new(RequestHeader::new(0, 1), 0x0E, Bytes::new());

        let response = session.handle_frame(&list_dir).await;

        assert_eq!(error_code(response), ErrorCode::NotSupported.as_u16());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_malformed_body_invalid_argument() {
        let (_dir, mut session) = started().await;
        let short = Frame::new(
            RequestHeader::new(0, 3),
            msg_type::STORAGE_GET_BLOCK,
            Bytes::from_static(&[0x00, 0x01]),
        );

        let response = session.handle_frame(&short).await;

        assert_eq!(error_code(response), ErrorCode::InvalidArgument.as_u16());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_error_details_returns_last_error() {
        let (_dir, mut session) = started().await;
        session.handle_frame(&frame(&open("missing.img"))).await;
        let last = session.last_error().unwrap().message.clone();
        assert!(last.contains("missing.img"));

        let details = Request::GetErrorDetails {
            code: ErrorCode::NotFound.as_u16(),
            max_length: 255,
        };
        let response = session.handle_frame(&frame(&details)).await;
        assert_eq!(
            response,
            Some(Response::Error {
                code: 3,
                message: last.clone()
            })
        );

        let truncated = Request::GetErrorDetails {
            code: ErrorCode::NotFound.as_u16(),
            max_length: 5,
        };
        let response = session.handle_frame(&frame(&truncated)).await;
        assert_eq!(
            response,
            Some(Response::Error {
                code: 3,
                message: last[..5].to_string()
            })
        );

        // A code that doesn't match the last error gets the generic text.
        let other = Request::GetErrorDetails {
            code: ErrorCode::Busy.as_u16(),
            max_length: 255,
        };
        let response = session.handle_frame(&frame(&other)).await;
        assert_eq!(
            response,
            Some(Response::Error {
                code: 8,
                message: "resource busy".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_date_time_shape() {
        let (_dir, mut session) = started().await;

        match session.handle_frame(&frame(&Request::GetDateTime)).await {
            Some(Response::DateTime { date, time }) => {
                assert!(date.iter().all(u8::is_ascii_digit));
                assert!(time.iter().all(u8::is_ascii_digit));
            }
            other => panic!("expected DATE-TIME, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hello_while_ready_restarts() {
        let (_dir, mut session) = started().await;
        session.handle_frame(&frame(&open("disk.img"))).await;
        assert_eq!(session.descriptors().open_count(), 1);

        let response = session.handle_frame(&frame(&hello())).await;

        assert!(matches!(response, Some(Response::SessionStarted { .. })));
        assert_eq!(session.descriptors().open_count(), 0);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_goodbye_closes_everything() {
        let (_dir, mut session) = started().await;
        session.handle_frame(&frame(&open("disk.img"))).await;

        let response = session.handle_frame(&frame(&Request::Goodbye)).await;

        assert!(response.is_none());
        assert!(session.is_closed());
        assert_eq!(session.descriptors().open_count(), 0);
        assert!(session.handle_frame(&frame(&hello())).await.is_none());
    }
}
