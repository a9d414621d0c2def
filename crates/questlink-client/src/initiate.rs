use url::Url;

use questlink_core::{error::AuthError, pkce::LoginChallenge};

use crate::{host::HostEnvironment, store::TokenStore};

/// Provider authorize endpoint plus the public client parameters needed to
/// build the redirect. The client secret never appears here.
#[derive(Debug, Clone)]
pub struct AuthorizeEndpoint {
    pub auth_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl AuthorizeEndpoint {
    /// Start a login attempt: mint a fresh challenge, stash the verifier,
    /// CSRF state, return path and host marker under flow-scoped keys, and
    /// return the authorize URL for the host to navigate to.
    ///
    /// The flow resumes on the provider's redirect back; nothing here fails
    /// except URL construction.
    pub fn begin_login(
        &self,
        store: &TokenStore,
        return_path: Option<&str>,
        host: HostEnvironment,
    ) -> Result<Url, AuthError> {
        let challenge = LoginChallenge::generate();

        store.stash_flow(&challenge.pkce.verifier, &challenge.csrf_state)?;
        if let Some(path) = return_path {
            store.set_return_path(path)?;
        }
        store.set_host_marker(host.as_str())?;

        let mut url = Url::parse(&self.auth_url)
            .map_err(|err| AuthError::Configuration(format!("invalid authorize url: {err}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", &self.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.scopes.join(" "));
            query.append_pair("code_challenge", &challenge.pkce.challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("state", &challenge.csrf_state);
        }

        tracing::debug!(target: "auth.initiate", host = host.as_str(), "login flow started");
        Ok(url)
    }
}
