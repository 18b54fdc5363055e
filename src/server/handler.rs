//! Per-connection SSH handler for a mock server
//!
//! Every credential is accepted. The only subsystem served is `sftp`, which
//! is handed to [`SftpHandler`] over the channel stream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use tracing::{debug, warn};

use super::sftp::{SftpHandler, SharedProvider};

pub(crate) struct MockSshHandler {
    hostname: Arc<str>,
    peer: Option<SocketAddr>,
    provider: SharedProvider,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl MockSshHandler {
    pub(crate) fn new(hostname: Arc<str>, peer: Option<SocketAddr>, provider: SharedProvider) -> Self {
        Self {
            hostname,
            peer,
            provider,
            channels: HashMap::new(),
        }
    }
}

impl russh::server::Handler for MockSshHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(host = %self.hostname, user = %user, method = "none", "Mock auth accepted");
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        debug!(host = %self.hostname, user = %user, method = "password", "Mock auth accepted");
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        debug!(host = %self.hostname, user = %user, method = "publickey", "Mock auth accepted");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != "sftp" {
            warn!(host = %self.hostname, subsystem = %name, "Subsystem not supported by mock server");
            let _ = session.channel_failure(channel);
            return Ok(());
        }

        let Some(open) = self.channels.remove(&channel) else {
            warn!(host = %self.hostname, "SFTP requested on unknown channel");
            let _ = session.channel_failure(channel);
            return Ok(());
        };

        let _ = session.channel_success(channel);
        debug!(host = %self.hostname, peer = ?self.peer, "SFTP subsystem started");

        let sftp = SftpHandler::new(Arc::clone(&self.hostname), Arc::clone(&self.provider));
        russh_sftp::server::run(open.into_stream(), sftp).await;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = session.close(channel);
        Ok(())
    }
}
