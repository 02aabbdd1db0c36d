use crate::{
    backend::GameBackend,
    command::{
        Command,
        CommandKind,
    },
    error::TransportError,
    session::Session,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use std::{
    fmt,
    time::Duration,
};
use tracing::debug;

/// HTTP gateway to a Nakama server fronting the game shard.
#[derive(Clone)]
pub struct NakamaGateway {
    base_url: String,
    server_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub user: AccountUser,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

impl NakamaGateway {
    pub fn new(
        base_url: impl Into<String>,
        server_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            server_key: server_key.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// RPC id the gateway registers for `command`.
    pub fn rpc_route(command: Command) -> String {
        match command.kind() {
            CommandKind::Persona => format!("nakama/{}", command.name()),
            CommandKind::Transaction => format!("tx/game/{}", command.name()),
            CommandKind::Query => format!("query/game/{}", command.name()),
        }
    }

    pub async fn account(&self, session: &Session) -> Result<Account, TransportError> {
        let url = format!("{}/v2/account", self.base_url);
        let res = self
            .http
            .get(url)
            .bearer_auth(session.token())
            .send()
            .await?;
        read_json(res).await
    }

    async fn issue_session<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Session, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .http
            .post(url)
            .basic_auth(&self.server_key, Some(""))
            .json(body)
            .send()
            .await?;
        let dto: SessionDto = read_json(res).await?;
        debug!(created = dto.created, "gateway issued session");
        Session::from_tokens(dto.token, dto.refresh_token.filter(|t| !t.is_empty()))
    }
}

impl fmt::Display for NakamaGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NakamaGateway({})", self.base_url)
    }
}

impl GameBackend for NakamaGateway {
    async fn authenticate_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, TransportError> {
        self.issue_session(
            "/v2/account/authenticate/email?create=true",
            &EmailAuthRequest { email, password },
        )
        .await
    }

    async fn refresh_session(&self, session: &Session) -> Result<Session, TransportError> {
        let token = session
            .refresh_token()
            .ok_or_else(|| TransportError::Token("session has no refresh token".into()))?;
        self.issue_session("/v2/account/session/refresh", &RefreshRequest { token })
            .await
    }

    async fn open_channel(&self, _session: &Session) -> Result<(), TransportError> {
        let url = format!("{}/healthcheck", self.base_url);
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(TransportError::status(status.as_u16(), body));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        session: &Session,
        command: Command,
        payload: Value,
    ) -> Result<Value, TransportError> {
        let url = format!("{}/v2/rpc/{}", self.base_url, Self::rpc_route(command));
        // the RPC body is the payload serialised as a JSON string
        let res = self
            .http
            .post(url)
            .bearer_auth(session.token())
            .json(&payload.to_string())
            .send()
            .await?;
        let envelope: RpcEnvelope = read_json(res).await?;
        match envelope.payload.as_deref() {
            None | Some("") => Ok(Value::Null),
            Some(raw) => serde_json::from_str(raw).map_err(TransportError::Envelope),
        }
    }
}

async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, TransportError> {
    let status = res.status();
    let bytes = res.bytes().await?;
    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).into_owned();
        return Err(TransportError::status(status.as_u16(), body));
    }
    serde_json::from_slice(&bytes).map_err(TransportError::Envelope)
}

#[derive(Serialize)]
struct EmailAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct SessionDto {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    created: bool,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    payload: Option<String>,
}
