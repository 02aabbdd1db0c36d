use crate::{
    backend::GameBackend,
    command::Command,
    dispatch::{
        Dispatcher,
        decode,
    },
    error::{
        ClaimError,
        DispatchError,
        TransportError,
    },
    messages::{
        ClaimPersonaMsg,
        Persona,
        PersonaStatus,
    },
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The account already held a persona; nothing was sent.
    AlreadyBound(Persona),
    Claimed(Persona),
}

impl ClaimOutcome {
    pub fn persona(&self) -> &Persona {
        match self {
            ClaimOutcome::AlreadyBound(persona) | ClaimOutcome::Claimed(persona) => persona,
        }
    }
}

/// Reads and establishes the persona bound to the signed-in account.
pub struct IdentityResolver<'a, B> {
    dispatcher: &'a Dispatcher<B>,
}

impl<'a, B: GameBackend> IdentityResolver<'a, B> {
    pub fn new(dispatcher: &'a Dispatcher<B>) -> Self {
        Self { dispatcher }
    }

    pub async fn resolve(&self) -> Result<Option<Persona>, DispatchError> {
        self.dispatcher.persona().await
    }

    /// Claims `tag` unless the account already holds a persona, in which case
    /// the existing binding wins even if it has a different tag.
    pub async fn claim(&self, tag: &str) -> Result<ClaimOutcome, ClaimError> {
        if let Some(existing) = self.resolve().await.map_err(ClaimError::Lookup)? {
            if existing.tag != tag {
                warn!(
                    bound = %existing.tag,
                    requested = %tag,
                    "account already holds a different persona"
                );
            }
            info!(tag = %existing.tag, status = ?existing.status, "persona already bound");
            return Ok(ClaimOutcome::AlreadyBound(existing));
        }

        let payload = serde_json::to_value(ClaimPersonaMsg {
            persona_tag: tag.to_string(),
        })
        .map_err(|source| ClaimError::Failed {
            tag: tag.to_string(),
            source: DispatchError::Encode {
                command: Command::ClaimPersona,
                source,
            },
        })?;
        let reply = self
            .dispatcher
            .invoke(Command::ClaimPersona, payload)
            .await
            .map_err(|source| claim_failure(tag, source))?;

        let persona = if reply.is_null() {
            Persona {
                tag: tag.to_string(),
                status: PersonaStatus::Pending,
                tick: 0,
                tx_hash: String::new(),
            }
        } else {
            decode(Command::ClaimPersona, reply).map_err(|err| ClaimError::Failed {
                tag: tag.to_string(),
                source: err.into(),
            })?
        };
        info!(tag = %persona.tag, status = ?persona.status, "persona claimed");
        Ok(ClaimOutcome::Claimed(persona))
    }
}

fn claim_failure(tag: &str, source: DispatchError) -> ClaimError {
    let tag = tag.to_string();
    if source.transport().is_some_and(TransportError::is_conflict) {
        warn!(%tag, "persona tag taken by another account");
        ClaimError::Conflict { tag, source }
    } else {
        ClaimError::Failed { tag, source }
    }
}
