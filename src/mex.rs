//! Metadata Exchange (MEX) document retrieval and parsing.
//!
//! A federated identity provider publishes a MEX document (WSDL plus
//! WS-Policy and WS-SecurityPolicy) describing its WS-Trust endpoints.
//! [`MexResponse::parse`] narrows that document down to a single
//! `(wstrust_url, action)` pair suitable for a username/password token
//! request: username-token policies first, then the bindings referencing
//! them, then the service ports carried by those bindings. Each stage that
//! comes up empty is a hard failure.

use tracing::{debug, warn};
use url::Url;

use crate::errors::{AuthError, ProtocolError, Result};
use crate::transport::{require_https, Transport};
use crate::xml::{ns, Element};

/// WS-Trust 1.3 issue action.
pub const WS_TRUST_13_ISSUE: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RST/Issue";
/// WS-Trust February 2005 issue action.
pub const WS_TRUST_2005_ISSUE: &str =
    "http://schemas.xmlsoap.org/ws/2005/02/trust/RST/Issue";

/// Known WSDL binding names and the SOAP action each implies.
const BINDING_TO_ACTION: &[(&str, &str)] = &[
    ("UserNameWsTrustBinding_IWSTrust13Async", WS_TRUST_13_ISSUE),
    ("CustomBinding_IWSTrust13Async", WS_TRUST_13_ISSUE),
    ("UserNameWsTrustBinding_IWSTrustFeb2005Async", WS_TRUST_2005_ISSUE),
    ("CustomBinding_IWSTrustFeb2005Async", WS_TRUST_2005_ISSUE),
];

// Child steps below a wsp:Policy node that mark it as a username/password
// policy. Two structurally distinct shapes are recognized.
const SIGNED_SUPPORTING: &[(&str, &str)] = &[
    (ns::WSP, "ExactlyOne"),
    (ns::WSP, "All"),
    (ns::SP, "SignedSupportingTokens"),
    (ns::WSP, "Policy"),
    (ns::SP, "UsernameToken"),
    (ns::WSP, "Policy"),
    (ns::SP, "WssUsernameToken10"),
];
const SIGNED_ENCRYPTED_SUPPORTING: &[(&str, &str)] = &[
    (ns::WSP, "ExactlyOne"),
    (ns::WSP, "All"),
    (ns::SSP, "SignedEncryptedSupportingTokens"),
    (ns::WSP, "Policy"),
    (ns::SSP, "UsernameToken"),
    (ns::WSP, "Policy"),
    (ns::SSP, "WssUsernameToken10"),
];

fn action_for_binding(binding: &str) -> Option<&'static str> {
    BINDING_TO_ACTION
        .iter()
        .find(|(name, _)| *name == binding)
        .map(|(_, action)| *action)
}

/// Fetches a federation metadata document over HTTPS.
#[derive(Debug, Clone)]
pub struct MexRequest {
    url: Url,
}

impl MexRequest {
    /// Create a request for the given federation metadata URL.
    ///
    /// Fails with a configuration error unless the URL is HTTPS.
    pub fn new(url: Url) -> Result<Self> {
        require_https(&url)?;
        Ok(Self { url })
    }

    /// Fetch and parse the MEX document. Exactly one GET per call.
    pub async fn execute(&self, transport: &dyn Transport) -> Result<MexResponse> {
        debug!(url = %self.url, "fetching mex document");
        let document = transport.get(&self.url).await?;
        MexResponse::parse(&document)
    }
}

/// The WS-Trust endpoint and SOAP action resolved from a MEX document.
#[derive(Debug, Clone)]
pub struct MexResponse {
    wstrust_url: Url,
    action: Option<&'static str>,
}

impl MexResponse {
    /// Parse the XML text of a MEX document.
    pub fn parse(document: &str) -> Result<Self> {
        let root = Element::parse(document)?;
        let definitions = find_definitions(&root)?;
        let policy_ids = parse_policy_ids(definitions)?;
        let bindings = parse_bindings(definitions, &policy_ids)?;
        let (address, binding) = parse_endpoint_and_binding(definitions, &bindings)?;
        Self::new(&address, &binding)
    }

    fn new(address: &str, binding: &str) -> Result<Self> {
        let wstrust_url = Url::parse(address)?;
        if wstrust_url.scheme() != "https" {
            return Err(AuthError::configuration(format!(
                "WS-Trust endpoint '{wstrust_url}' is not https; \
                 token negotiation is never done over plaintext"
            )));
        }
        Ok(Self {
            wstrust_url,
            action: action_for_binding(binding),
        })
    }

    /// The resolved WS-Trust endpoint. Always HTTPS.
    pub fn wstrust_url(&self) -> &Url {
        &self.wstrust_url
    }

    /// The SOAP action implied by the endpoint's binding, or `None` when the
    /// binding name is not a known WS-Trust variant. Whether that is fatal
    /// is decided at the token-exchange stage.
    pub fn action(&self) -> Option<&'static str> {
        self.action
    }
}

fn find_definitions(root: &Element) -> Result<&Element> {
    if root.is(ns::WSDL, "definitions") {
        return Ok(root);
    }
    root.descendants()
        .find(|e| e.is(ns::WSDL, "definitions"))
        .ok_or_else(|| ProtocolError::NoMatchingPolicy.into())
}

fn parse_policy_ids(definitions: &Element) -> Result<Vec<String>> {
    let mut policy_ids = Vec::new();
    for policy in definitions.children_named(ns::WSP, "Policy") {
        if !policy.has_path(SIGNED_SUPPORTING) && !policy.has_path(SIGNED_ENCRYPTED_SUPPORTING) {
            continue;
        }
        if let Some(id) = policy.attr(Some(ns::WSU), "Id") {
            policy_ids.push(format!("#{id}"));
        }
    }
    if policy_ids.is_empty() {
        return Err(ProtocolError::NoMatchingPolicy.into());
    }
    Ok(policy_ids)
}

fn parse_bindings(definitions: &Element, policy_ids: &[String]) -> Result<Vec<String>> {
    let mut bindings = Vec::new();
    for binding in definitions.children_named(ns::WSDL, "binding") {
        let Some(reference) = binding
            .child(ns::WSP, "PolicyReference")
            .and_then(|r| r.attr(None, "URI"))
        else {
            continue;
        };
        if !policy_ids.iter().any(|id| id == reference) {
            continue;
        }
        if let Some(name) = binding.attr(None, "name") {
            bindings.push(name.to_string());
        }
    }
    if bindings.is_empty() {
        return Err(ProtocolError::NoMatchingBinding.into());
    }
    Ok(bindings)
}

fn parse_endpoint_and_binding(
    definitions: &Element,
    bindings: &[String],
) -> Result<(String, String)> {
    let mut endpoints = Vec::new();
    for service in definitions.children_named(ns::WSDL, "service") {
        for port in service.children_named(ns::WSDL, "port") {
            let Some(binding_ref) = port.attr(None, "binding") else {
                continue;
            };
            // The attribute is QName-ish ("tns:Name"); only the local part
            // is compared against the matched binding names.
            let binding = binding_ref.rsplit(':').next().unwrap_or(binding_ref);
            if !bindings.iter().any(|b| b == binding) {
                continue;
            }
            let Some(address) = port
                .child(ns::SOAP12_WSDL, "address")
                .and_then(|a| a.attr(None, "location"))
            else {
                continue;
            };
            endpoints.push((address.to_string(), binding.to_string()));
        }
    }
    if endpoints.is_empty() {
        return Err(ProtocolError::NoValidEndpoint.into());
    }
    if endpoints.len() > 1 {
        warn!(
            count = endpoints.len(),
            "multiple WS-Trust endpoints found in the mex response; only the first is used"
        );
    }
    Ok(endpoints.remove(0))
}
