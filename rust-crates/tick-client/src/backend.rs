use crate::{
    command::Command,
    error::{
        FetchError,
        TransportError,
    },
    messages::{
        ReceiptBatch,
        Tick,
    },
    session::Session,
};
use serde_json::Value;

/// Session issuance and the single remote-procedure primitive of the game gateway.
pub trait GameBackend: Send + Sync {
    fn authenticate_email(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, TransportError>> + Send;

    fn refresh_session(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<Session, TransportError>> + Send;

    /// Opens (or probes) the transport channel that RPCs will use.
    fn open_channel(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// One round trip. `Value::Null` means the gateway replied without a payload.
    fn invoke(
        &self,
        session: &Session,
        command: Command,
        payload: Value,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// Window query over the backend's receipt log.
pub trait ReceiptSource: Send + Sync {
    fn fetch_receipts(
        &self,
        start_tick: Tick,
    ) -> impl Future<Output = Result<ReceiptBatch, FetchError>> + Send;
}
