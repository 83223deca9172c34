//! WS-Trust RequestSecurityToken exchange.
//!
//! Builds a SOAP 1.2 RST envelope carrying the user's name and password in a
//! WS-Security UsernameToken, posts it to the endpoint resolved from MEX,
//! and extracts the issued assertion from the RSTR. The assertion XML is
//! sliced out of the response verbatim; re-serializing it would invalidate
//! the provider's signature.

use chrono::{Duration, SecondsFormat, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::errors::{AuthError, ProtocolError, Result};
use crate::mex::{MexResponse, WS_TRUST_2005_ISSUE};
use crate::transport::{require_https, Transport};
use crate::xml::ns;

/// OAuth2 grant type for SAML 1.1 bearer assertions.
pub const SAML1_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:saml1_1-bearer";
/// OAuth2 grant type for SAML 2.0 bearer assertions.
pub const SAML2_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";

/// Default relying party named in the RST AppliesTo element.
pub const DEFAULT_APPLIES_TO: &str = "urn:federation:MicrosoftOnline";

const SAML1_TOKEN_TYPES: &[&str] = &[
    "urn:oasis:names:tc:SAML:1.0:assertion",
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1",
];
const SAML2_TOKEN_TYPES: &[&str] = &[
    "urn:oasis:names:tc:SAML:2.0:assertion",
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0",
];

// Lifetime of the security header timestamp, matching the window commonly
// accepted by AD FS.
const TIMESTAMP_LIFETIME_MINUTES: i64 = 10;

/// A WS-Trust token request bound to one endpoint and SOAP action.
#[derive(Debug, Clone)]
pub struct WsTrustRequest {
    endpoint: Url,
    action: String,
    applies_to: String,
}

impl WsTrustRequest {
    /// Create a request from an endpoint and action.
    ///
    /// Fails with a configuration error unless the endpoint is HTTPS.
    pub fn new(endpoint: Url, action: impl Into<String>) -> Result<Self> {
        require_https(&endpoint)?;
        Ok(Self {
            endpoint,
            action: action.into(),
            applies_to: DEFAULT_APPLIES_TO.to_string(),
        })
    }

    /// Create a request from a parsed MEX response.
    ///
    /// A MEX response whose binding was not a recognized WS-Trust variant
    /// carries no action; that is fatal here.
    pub fn from_mex(mex: &MexResponse) -> Result<Self> {
        let action = mex.action().ok_or_else(|| {
            AuthError::configuration(
                "mex document resolved to an unrecognized WS-Trust binding; \
                 no SOAP action is known for it",
            )
        })?;
        Self::new(mex.wstrust_url().clone(), action)
    }

    /// Name a different relying party in the AppliesTo element.
    pub fn applies_to(mut self, applies_to: impl Into<String>) -> Self {
        self.applies_to = applies_to.into();
        self
    }

    /// Request a token for the given username and password.
    ///
    /// Exactly one network round trip per call; retries are the caller's
    /// concern.
    pub async fn execute(
        &self,
        username: &str,
        password: &str,
        transport: &dyn Transport,
    ) -> Result<WsTrustResponse> {
        let envelope = self.envelope(username, password);
        debug!(endpoint = %self.endpoint, action = %self.action, "sending WS-Trust token request");
        let response = transport
            .post_soap(&self.endpoint, &self.action, envelope)
            .await?;
        WsTrustResponse::parse(&response)
    }

    fn envelope(&self, username: &str, password: &str) -> String {
        let (trust_ns, request_type, key_type) = if self.action == WS_TRUST_2005_ISSUE {
            (
                ns::TRUST_2005,
                "http://schemas.xmlsoap.org/ws/2005/02/trust/Issue",
                "http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey",
            )
        } else {
            (
                ns::TRUST_13,
                "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue",
                "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Bearer",
            )
        };

        let created = Utc::now();
        let expires = created + Duration::minutes(TIMESTAMP_LIFETIME_MINUTES);

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{soap_env}" xmlns:wsa="{wsa}" xmlns:wsu="{wsu}">
  <s:Header>
    <wsa:Action s:mustUnderstand="1">{action}</wsa:Action>
    <wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
    <wsa:ReplyTo><wsa:Address>{wsa}/anonymous</wsa:Address></wsa:ReplyTo>
    <wsa:To s:mustUnderstand="1">{to}</wsa:To>
    <wsse:Security s:mustUnderstand="1" xmlns:wsse="{wsse}">
      <wsu:Timestamp wsu:Id="_0">
        <wsu:Created>{created}</wsu:Created>
        <wsu:Expires>{expires}</wsu:Expires>
      </wsu:Timestamp>
      <wsse:UsernameToken wsu:Id="UsernameToken-{token_id}">
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password>{password}</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <trust:RequestSecurityToken xmlns:trust="{trust_ns}">
      <wsp:AppliesTo xmlns:wsp="{wsp}">
        <wsa:EndpointReference><wsa:Address>{applies_to}</wsa:Address></wsa:EndpointReference>
      </wsp:AppliesTo>
      <trust:KeyType>{key_type}</trust:KeyType>
      <trust:RequestType>{request_type}</trust:RequestType>
    </trust:RequestSecurityToken>
  </s:Body>
</s:Envelope>"#,
            soap_env = ns::SOAP12_ENV,
            wsa = ns::WSA,
            wsu = ns::WSU,
            wsse = ns::WSSE,
            wsp = ns::WSP,
            action = self.action,
            message_id = Uuid::new_v4(),
            to = self.endpoint,
            created = created.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires = expires.to_rfc3339_opts(SecondsFormat::Millis, true),
            token_id = Uuid::new_v4(),
            username = escape(username),
            password = escape(password),
            trust_ns = trust_ns,
            key_type = key_type,
            request_type = request_type,
            applies_to = escape(self.applies_to.as_str()),
        )
    }
}

/// The issued assertion and the OAuth2 grant type it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsTrustResponse {
    token: String,
    grant_type: &'static str,
}

impl WsTrustResponse {
    /// Parse an RSTR document, extracting the issued token verbatim.
    pub fn parse(document: &str) -> Result<Self> {
        let mut reader = Reader::from_str(document);

        let mut token: Option<String> = None;
        let mut token_type: Option<String> = None;
        let mut fault_reason: Option<String> = None;

        let mut token_start = 0usize;
        let mut token_depth = 0usize;
        let mut in_token_type = false;
        let mut in_fault = false;
        let mut in_fault_text = false;

        loop {
            // Offset of the upcoming event, used to slice the raw token out
            // of the response text.
            let event_start = reader.buffer_position() as usize;
            match reader.read_event().map_err(AuthError::xml)? {
                Event::Start(start) => {
                    if token_depth > 0 {
                        token_depth += 1;
                        continue;
                    }
                    match local_part(start.name().as_ref()) {
                        "RequestedSecurityToken" if token.is_none() => {
                            token_start = reader.buffer_position() as usize;
                            token_depth = 1;
                        }
                        "TokenType" => in_token_type = true,
                        "Fault" => in_fault = true,
                        "Text" if in_fault => in_fault_text = true,
                        _ => {}
                    }
                }
                Event::End(end) => {
                    if token_depth > 0 {
                        token_depth -= 1;
                        if token_depth == 0 {
                            token = Some(document[token_start..event_start].trim().to_string());
                        }
                        continue;
                    }
                    match local_part(end.name().as_ref()) {
                        "TokenType" => in_token_type = false,
                        "Fault" => in_fault = false,
                        "Text" => in_fault_text = false,
                        _ => {}
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(AuthError::xml)?;
                    if in_token_type && token_type.is_none() && !text.trim().is_empty() {
                        token_type = Some(text.trim().to_string());
                    } else if in_fault_text && fault_reason.is_none() {
                        fault_reason = Some(text.trim().to_string());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(reason) = fault_reason {
            return Err(ProtocolError::SoapFault(reason).into());
        }

        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(ProtocolError::MissingSecurityToken)?;
        let grant_type = match token_type.as_deref() {
            Some(t) if SAML1_TOKEN_TYPES.contains(&t) => SAML1_BEARER_GRANT,
            Some(t) if SAML2_TOKEN_TYPES.contains(&t) => SAML2_BEARER_GRANT,
            Some(t) => return Err(ProtocolError::UnknownTokenType(t.to_string()).into()),
            None => {
                return Err(ProtocolError::UnknownTokenType("none declared".to_string()).into())
            }
        };

        Ok(Self { token, grant_type })
    }

    /// The raw assertion XML, exactly as issued.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The OAuth2 grant type matching the issued token type.
    pub fn grant_type(&self) -> &'static str {
        self.grant_type
    }
}

fn local_part(name: &[u8]) -> &str {
    let local = name
        .iter()
        .rposition(|&b| b == b':')
        .map_or(name, |i| &name[i + 1..]);
    std::str::from_utf8(local).unwrap_or_default()
}
