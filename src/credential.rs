//! User credentials and the account-type dependent token request parameters.
//!
//! A username either belongs to a *managed* account, whose password the
//! provider validates directly, or to a *federated* account, whose password
//! is only known to a third-party identity provider reachable over WS-Trust.
//! Realm discovery tells the two apart; [`UserCredential::request_params`]
//! then assembles the OAuth2 form parameters appropriate for the account.

use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::{AuthError, Result};
use crate::mex::MexRequest;
use crate::transport::Transport;
use crate::wstrust::WsTrustRequest;

/// Default authority host queried for realm discovery.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope requested with every token request.
pub const OPENID_SCOPE: &str = "openid";

const PASSWORD_GRANT: &str = "password";

/// How the identity provider validates a user's password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// Password validated by a third-party identity provider over WS-Trust.
    Federated,
    /// Password validated directly by the primary provider.
    Managed,
    /// Anything else discovery reports; no token flow exists for it.
    Unknown,
}

/// Realm discovery response for one username.
#[derive(Debug, Clone, Deserialize)]
struct UserRealm {
    account_type: String,
    #[serde(default)]
    federation_metadata_url: Option<String>,
}

impl UserRealm {
    fn account_type(&self) -> AccountType {
        match self.account_type.as_str() {
            "Federated" => AccountType::Federated,
            "Managed" => AccountType::Managed,
            _ => AccountType::Unknown,
        }
    }
}

/// A username/password credential and its discovered realm.
pub struct UserCredential {
    username: String,
    password: String,
    authority: Url,
    // Written once after the first successful discovery. Not guarded by a
    // mutex: callers racing before the first write may each issue a
    // discovery request, and the same username always discovers the same
    // realm, so the duplicate request is harmless.
    realm: OnceLock<UserRealm>,
}

impl UserCredential {
    /// Create a credential resolved against the default authority.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let authority = Url::parse(DEFAULT_AUTHORITY).expect("default authority is a valid URL");
        Self::with_authority(username, password, authority)
    }

    /// Create a credential resolved against a specific authority host.
    pub fn with_authority(
        username: impl Into<String>,
        password: impl Into<String>,
        authority: Url,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            authority,
            realm: OnceLock::new(),
        }
    }

    /// The username this credential belongs to.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Resolve the account type for this username.
    ///
    /// The discovery result is memoized per instance: repeated reads issue
    /// at most one discovery request.
    pub async fn account_type(&self, transport: &dyn Transport) -> Result<AccountType> {
        Ok(self.realm(transport).await?.account_type())
    }

    /// Assemble the OAuth2 token-request parameters for this credential.
    ///
    /// Federated accounts redo the full MEX and WS-Trust handshake on every
    /// call, because an issued assertion is single-use. Managed accounts
    /// need no network beyond the cached realm discovery.
    pub async fn request_params(&self, transport: &dyn Transport) -> Result<TokenRequestParams> {
        let realm = self.realm(transport).await?;
        match realm.account_type() {
            AccountType::Federated => self.federated_params(realm, transport).await,
            AccountType::Managed => Ok(TokenRequestParams::Managed {
                username: self.username.clone(),
                password: self.password.clone(),
            }),
            AccountType::Unknown => {
                Err(AuthError::UnsupportedAccountType(realm.account_type.clone()))
            }
        }
    }

    async fn realm(&self, transport: &dyn Transport) -> Result<&UserRealm> {
        if let Some(realm) = self.realm.get() {
            return Ok(realm);
        }
        let url = self.discovery_url()?;
        debug!(url = %url, "discovering user realm");
        let body = transport.get(&url).await?;
        let realm: UserRealm = serde_json::from_str(&body)?;
        debug!(account_type = %realm.account_type, "user realm discovered");
        Ok(self.realm.get_or_init(|| realm))
    }

    fn discovery_url(&self) -> Result<Url> {
        let mut url = self.authority.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::configuration("authority URL cannot be a base"))?
            .extend(["common", "userrealm", &self.username]);
        url.set_query(Some("api-version=1.0"));
        Ok(url)
    }

    async fn federated_params(
        &self,
        realm: &UserRealm,
        transport: &dyn Transport,
    ) -> Result<TokenRequestParams> {
        let metadata_url = realm.federation_metadata_url.as_deref().ok_or_else(|| {
            AuthError::configuration(
                "realm discovery reported a federated account without a federation_metadata_url",
            )
        })?;
        let mex = MexRequest::new(Url::parse(metadata_url)?)?
            .execute(transport)
            .await?;
        let response = WsTrustRequest::from_mex(&mex)?
            .execute(&self.username, &self.password, transport)
            .await?;
        Ok(TokenRequestParams::Federated {
            assertion: BASE64.encode(response.token()),
            grant_type: response.grant_type().to_string(),
        })
    }
}

impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("authority", &self.authority.as_str())
            .finish()
    }
}

/// OAuth2 token-endpoint form parameters, shaped by account type.
///
/// Recomputed on every [`UserCredential::request_params`] call and never
/// cached; assertions are single-use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequestParams {
    /// Parameters for a federated account: a base64-encoded assertion and
    /// the bearer grant type matching its SAML version.
    Federated {
        assertion: String,
        grant_type: String,
    },
    /// Parameters for a managed account: the password itself.
    Managed { username: String, password: String },
}

impl TokenRequestParams {
    /// The exact form pairs to POST to the token endpoint, nothing more.
    pub fn into_form(self) -> Vec<(&'static str, String)> {
        match self {
            Self::Federated {
                assertion,
                grant_type,
            } => vec![
                ("assertion", assertion),
                ("grant_type", grant_type),
                ("scope", OPENID_SCOPE.to_string()),
            ],
            Self::Managed { username, password } => vec![
                ("username", username),
                ("password", password),
                ("grant_type", PASSWORD_GRANT.to_string()),
                ("scope", OPENID_SCOPE.to_string()),
            ],
        }
    }
}
