use std::fmt;
use std::sync::Arc;

use crate::auth::gssapi::ContextProvider;

/// Auth protocol version spoken by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const V1_0: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Service name used to build the GSSAPI target principal when the username
/// carries no `serviceName` parameter.
pub const DEFAULT_SERVICE_NAME: &str = "mongosql";

/// Largest single-conversation payload accepted from the server.
pub const DEFAULT_MAX_CONVERSATION_BUFFER: usize = 65536;

pub const DEFAULT_MAX_CONVERSATIONS: u32 = 64;

/// Largest server message the default limits allow: every conversation
/// sending a full buffer behind its 4-byte length.
pub const DEFAULT_MAX_SERVER_PAYLOAD: usize =
    DEFAULT_MAX_CONVERSATIONS as usize * (4 + DEFAULT_MAX_CONVERSATION_BUFFER);

/// Highest SCRAM iteration count accepted from a server.
pub const DEFAULT_MAX_SCRAM_ITERATIONS: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Version the server must announce in the handshake.
    pub protocol_version: ProtocolVersion,

    /// Upper bound on one conversation's inbound segment.
    pub max_conversation_buffer: usize,

    /// Upper bound on the conversation count a server may request.
    pub max_conversations: u32,

    /// Ceiling on the server-chosen SCRAM iteration count.
    pub max_scram_iterations: u32,

    /// Fallback service for the GSSAPI target principal (`<service>@<host>`).
    pub service_name: String,

    /// Security-context backend for `GSSAPI`. `None` disables the mechanism.
    pub context_provider: Option<Arc<dyn ContextProvider>>,
}

impl AuthConfig {
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_max_conversation_buffer(mut self, max: usize) -> Self {
        self.max_conversation_buffer = max;
        self
    }

    pub fn with_max_conversations(mut self, max: u32) -> Self {
        self.max_conversations = max;
        self
    }

    pub fn with_max_scram_iterations(mut self, max: u32) -> Self {
        self.max_scram_iterations = max;
        self
    }

    /// Largest server message these limits allow.
    pub fn max_server_payload(&self) -> usize {
        (self.max_conversations as usize).saturating_mul(self.max_conversation_buffer.saturating_add(4))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::V1_0,
            max_conversation_buffer: DEFAULT_MAX_CONVERSATION_BUFFER,
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            max_scram_iterations: DEFAULT_MAX_SCRAM_ITERATIONS,
            service_name: DEFAULT_SERVICE_NAME.into(),
            context_provider: None,
        }
    }
}
