/*!
# wstrust-auth

Token-acquisition core for obtaining OAuth2 token-request parameters on
behalf of an application's end users.

Two account types are supported:

- **Managed** accounts, whose password the identity provider validates
  directly. The token request carries the username and password.
- **Federated** accounts, whose identity is brokered through a third-party
  WS-Trust/SAML identity provider. The provider's Metadata Exchange (MEX)
  document is fetched and parsed to locate the correct WS-Trust endpoint
  and SOAP action, a RequestSecurityToken exchange yields a signed SAML
  assertion, and that assertion (base64-encoded) becomes the token request.

Which flow applies is resolved once per credential through realm discovery
and cached on the instance.

## Quick start

```rust,no_run
use wstrust_auth::{HttpTransport, TokenRequestParams, UserCredential};

# async fn run() -> wstrust_auth::Result<()> {
let transport = HttpTransport::new();
let credential = UserCredential::new("user@contoso.com", "password");

// The parameter shape depends on the discovered account type.
let params = credential.request_params(&transport).await?;
match &params {
    TokenRequestParams::Federated { .. } => { /* assertion grant */ }
    TokenRequestParams::Managed { .. } => { /* password grant */ }
}

// Form pairs ready to POST to the provider's token endpoint.
let form = params.into_form();
# Ok(())
# }
```

## Scope

This crate stops at the assembled parameters. OAuth2 token-endpoint
interaction, token caching and refresh, and any UI flows belong to outer
layers. All HTTP goes through the injected [`Transport`]; timeouts and
retry policy live there, not here.
*/

pub mod credential;
pub mod errors;
pub mod mex;
pub mod transport;
pub mod wstrust;
pub mod xml;

pub use credential::{AccountType, TokenRequestParams, UserCredential, DEFAULT_AUTHORITY};
pub use errors::{AuthError, ProtocolError, Result};
pub use mex::{MexRequest, MexResponse};
pub use transport::{HttpTransport, Transport};
pub use wstrust::{WsTrustRequest, WsTrustResponse};
