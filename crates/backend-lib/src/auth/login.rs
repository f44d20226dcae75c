// ============================
// crates/backend-lib/src/auth/login.rs
// ============================
//! Login requests.
//!
//! A login is a POST without an `osu-token`. Its body is plain text:
//!
//! ```text
//! username
//! password md5
//! version|utc_offset|display_city|client_hashes|block_non_friend_dms
//! ```
use bancho_common::server::{self, login_reply, PROTOCOL_VERSION};
use bancho_common::ChannelInfo;
use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::presence::end_session;
use crate::metrics::{LOGINS, LOGIN_FAILURES};
use crate::presence::presence_packets;
use crate::privileges::Privileges;
use crate::sessions::NewSession;
use crate::AppState;

/// Token returned with a failed login.
pub const FAILED_LOGIN_TOKEN: &str = "no";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password_md5: String,
    pub version: String,
    pub utc_offset: i8,
    pub display_city: bool,
    pub client_hashes: String,
    pub block_non_friend_dms: bool,
}

impl LoginRequest {
    /// Parse a login body. `None` if it is not a well-formed login.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(body).ok()?;
        let mut lines = text.lines();

        let username = lines.next()?.trim().to_string();
        let password_md5 = lines.next()?.trim().to_string();
        let mut client = lines.next()?.split('|');

        let version = client.next()?.to_string();
        let utc_offset = client.next()?.trim().parse::<i8>().ok()?;
        let display_city = client.next()? == "1";
        let client_hashes = client.next()?.to_string();
        let block_non_friend_dms = client.next()? == "1";

        if username.is_empty() || password_md5.is_empty() {
            return None;
        }

        Some(Self {
            username,
            password_md5,
            version,
            utc_offset,
            display_city,
            client_hashes,
            block_non_friend_dms,
        })
    }

    pub fn is_tournament_client(&self) -> bool {
        self.version.contains("tourney")
    }
}

/// Token to hand back and the response body.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub body: Vec<u8>,
}

impl LoginOutcome {
    fn failed(reply: i32) -> Self {
        counter!(LOGIN_FAILURES).increment(1);
        Self {
            token: FAILED_LOGIN_TOKEN.to_string(),
            body: server::user_id(reply),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.token != FAILED_LOGIN_TOKEN
    }
}

/// Authenticate a client and create its session.
pub async fn login(state: &AppState, body: &[u8]) -> Result<LoginOutcome, AppError> {
    let Some(request) = LoginRequest::parse(body) else {
        warn!(len = body.len(), "malformed login request");
        return Ok(LoginOutcome::failed(login_reply::ERROR));
    };

    let Some(account) = state.accounts.fetch_by_username(&request.username).await? else {
        warn!(username = %request.username, "login for unknown account");
        return Ok(LoginOutcome::failed(login_reply::AUTHENTICATION_FAILED));
    };
    if !state
        .auth
        .verify_credentials(&account, &request.password_md5)
        .await?
    {
        warn!(account_id = account.account_id, "login with wrong password");
        return Ok(LoginOutcome::failed(login_reply::AUTHENTICATION_FAILED));
    }

    let tournament = request.is_tournament_client();
    if tournament && !account.privileges.contains(Privileges::TOURNAMENT) {
        warn!(account_id = account.account_id, "tournament client without privilege");
        return Ok(LoginOutcome::failed(login_reply::AUTHENTICATION_FAILED));
    }

    if !tournament {
        if let Some(previous) = state
            .sessions
            .fetch_primary_by_account_id(account.account_id)
            .await?
        {
            info!(
                account_id = account.account_id,
                session_id = %previous.session_id,
                "replacing existing session"
            );
            end_session(state, &previous).await?;
        }
    }

    let session = state
        .sessions
        .create(NewSession {
            account_id: account.account_id,
            username: account.username.clone(),
            privileges: account.privileges,
            country: account.country.clone(),
            country_code: account.country_code,
            latitude: 0.0,
            longitude: 0.0,
            utc_offset: request.utc_offset,
            block_non_friend_dms: request.block_non_friend_dms,
            primary: !tournament,
        })
        .await?;

    let mut out = server::protocol_version(PROTOCOL_VERSION);
    out.extend(server::user_id(account.account_id));
    out.extend(server::privileges(account.privileges.to_client()));

    for channel in state.channels.fetch_many(Some(account.privileges)).await? {
        if channel.temporary {
            continue;
        }
        if channel.auto_join {
            state
                .channels
                .add_member(channel.channel_id, session.session_id)
                .await?;
            out.extend(server::channel_join_success(&channel.name));
        }
        let member_count = state.channels.member_count(channel.channel_id).await?;
        out.extend(server::channel_info(&ChannelInfo {
            name: channel.name.clone(),
            topic: channel.topic.clone(),
            player_count: u16::try_from(member_count).unwrap_or(u16::MAX),
        }));
    }
    out.extend(server::channel_info_end());
    out.extend(server::friends_list(&[]));
    out.extend(server::silence_end(0));

    let own = presence_packets(state, &session).await?;
    out.extend_from_slice(&own);

    let others: Vec<_> = state
        .sessions
        .fetch_all(None)
        .await?
        .into_iter()
        .filter(|s| s.session_id != session.session_id)
        .collect();
    for other in &others {
        out.extend(presence_packets(state, other).await?);
    }
    let other_ids: Vec<Uuid> = others.iter().map(|s| s.session_id).collect();
    state.outbox.enqueue_many(&other_ids, &own).await?;

    counter!(LOGINS).increment(1);
    info!(
        session_id = %session.session_id,
        account_id = account.account_id,
        username = %account.username,
        tournament,
        "login"
    );

    Ok(LoginOutcome {
        token: session.session_id.to_string(),
        body: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_body() {
        let body = b"Alice\n5f4dcc3b5aa765d61d8327deb882cf99\nb20240123.1|-5|1|abc:def:|0\n";
        let request = LoginRequest::parse(body).unwrap();

        assert_eq!(request.username, "Alice");
        assert_eq!(request.utc_offset, -5);
        assert!(request.display_city);
        assert!(!request.block_non_friend_dms);
        assert!(!request.is_tournament_client());
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(LoginRequest::parse(b"").is_none());
        assert!(LoginRequest::parse(b"alice\nhash\n").is_none());
        assert!(LoginRequest::parse(b"alice\nhash\nb1|notanumber|1|x|0").is_none());
        assert!(LoginRequest::parse(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_tournament_version() {
        let body = b"alice\nhash\nb20240123tourney|0|0|x|1";
        let request = LoginRequest::parse(body).unwrap();
        assert!(request.is_tournament_client());
        assert!(request.block_non_friend_dms);
    }
}
