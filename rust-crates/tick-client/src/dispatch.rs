use crate::{
    backend::GameBackend,
    command::Command,
    confirm::TickSource,
    error::{
        DecodeError,
        DispatchError,
        PreconditionError,
        SessionError,
    },
    messages::{
        CurrentTickReply,
        Empty,
        Persona,
        Submission,
        Tick,
    },
    session::{
        Credentials,
        Session,
        SessionGuard,
    },
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

/// Sends commands through the session guard and turns replies into typed values.
///
/// Every call is exactly one round trip to the command itself; retrying is the
/// caller's decision.
pub struct Dispatcher<B> {
    backend: B,
    guard: SessionGuard,
}

impl<B: GameBackend> Dispatcher<B> {
    pub fn new(backend: B, guard: SessionGuard) -> Self {
        Self { backend, guard }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session_guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, SessionError> {
        self.guard.authenticate(&self.backend, credentials).await
    }

    /// Raw invocation. Gameplay commands additionally require a bound persona.
    pub async fn invoke(
        &self,
        command: Command,
        payload: Value,
    ) -> Result<Value, DispatchError> {
        let session = self.usable_session().await?;
        if command.requires_identity() {
            self.require_persona(&session).await?;
        }
        self.round_trip(&session, command, payload).await
    }

    pub async fn submit<P: Serialize>(
        &self,
        command: Command,
        payload: &P,
    ) -> Result<Submission, DispatchError> {
        let payload = encode(command, payload)?;
        let reply = self.invoke(command, payload).await?;
        let submission: Submission = decode(command, reply)?;
        if submission.tx_hash.is_empty() {
            return Err(DecodeError::EmptyTxHash { command }.into());
        }
        info!(
            %command,
            tx_hash = %submission.tx_hash,
            tick = submission.tick,
            "transaction submitted"
        );
        Ok(submission)
    }

    pub async fn query<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        payload: &P,
    ) -> Result<R, DispatchError> {
        let payload = encode(command, payload)?;
        let reply = self.invoke(command, payload).await?;
        Ok(decode(command, reply)?)
    }

    /// Like [`Dispatcher::query`], but an empty reply is `None` instead of an error.
    pub async fn query_optional<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        payload: &P,
    ) -> Result<Option<R>, DispatchError> {
        let payload = encode(command, payload)?;
        let reply = self.invoke(command, payload).await?;
        if reply.is_null() {
            return Ok(None);
        }
        Ok(Some(decode(command, reply)?))
    }

    pub async fn current_tick(&self) -> Result<Tick, DispatchError> {
        let reply: CurrentTickReply = self.query(Command::CurrentTick, &Empty {}).await?;
        Ok(reply.current_tick)
    }

    /// Looks the persona up on every call; the answer is never cached.
    pub async fn persona(&self) -> Result<Option<Persona>, DispatchError> {
        let session = self.usable_session().await?;
        self.lookup_persona(&session).await
    }

    async fn usable_session(&self) -> Result<Arc<Session>, DispatchError> {
        if self.guard.current().await.is_none() {
            return Err(PreconditionError::NoSession.into());
        }
        if !self.guard.channel_open() {
            return Err(PreconditionError::NoChannel.into());
        }
        Ok(self.guard.ensure_valid(&self.backend).await?)
    }

    async fn require_persona(&self, session: &Session) -> Result<Persona, DispatchError> {
        self.lookup_persona(session)
            .await?
            .ok_or_else(|| PreconditionError::NoIdentity.into())
    }

    async fn lookup_persona(
        &self,
        session: &Session,
    ) -> Result<Option<Persona>, DispatchError> {
        let command = Command::ShowPersona;
        match self.round_trip(session, command, Value::Object(Default::default())).await {
            Ok(Value::Null) => Ok(None),
            Ok(reply) => {
                let persona: Persona = decode(command, reply)?;
                debug!(tag = %persona.tag, status = ?persona.status, "persona lookup");
                Ok(persona.is_held().then_some(persona))
            }
            Err(DispatchError::Transport { source, .. }) if source.is_not_found() => {
                debug!("no persona bound to account");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn round_trip(
        &self,
        session: &Session,
        command: Command,
        payload: Value,
    ) -> Result<Value, DispatchError> {
        debug!(%command, "invoking remote procedure");
        self.backend
            .invoke(session, command, payload)
            .await
            .map_err(|source| {
                if !source.is_not_found() {
                    warn!(%command, err = %source, "remote procedure failed");
                }
                DispatchError::Transport { command, source }
            })
    }
}

impl<B: GameBackend> TickSource for Dispatcher<B> {
    async fn read_tick(&self) -> Result<Tick, DispatchError> {
        self.current_tick().await
    }
}

fn encode<P: Serialize>(command: Command, payload: &P) -> Result<Value, DispatchError> {
    serde_json::to_value(payload).map_err(|source| DispatchError::Encode { command, source })
}

pub(crate) fn decode<R: DeserializeOwned>(
    command: Command,
    reply: Value,
) -> Result<R, DecodeError> {
    if reply.is_null() {
        return Err(DecodeError::MissingPayload { command });
    }
    serde_json::from_value(reply).map_err(|source| DecodeError::Shape { command, source })
}
