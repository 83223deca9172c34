//! End-to-end token-parameter assembly against a scripted transport:
//! realm discovery, MEX retrieval and parsing, WS-Trust exchange, and the
//! final OAuth2 form shape for each account type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use url::Url;

use wstrust_auth::{
    AccountType, AuthError, Result, TokenRequestParams, Transport, UserCredential,
};

const USERNAME: &str = "user@contoso.com";
const PASSWORD: &str = "hunter2";
const MEX_URL: &str = "https://adfs.contoso.com/federationmetadata/2007-06/federationmetadata.xml";
const WSTRUST_URL: &str = "https://adfs.contoso.com/adfs/services/trust/13/usernamemixed";
const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_assertion"><saml:Subject>user@contoso.com</saml:Subject></saml:Assertion>"#;

fn realm_json(account_type: &str) -> String {
    format!(
        r#"{{"ver": "1.0", "account_type": "{account_type}",
            "domain_name": "contoso.com",
            "federation_metadata_url": "{MEX_URL}"}}"#
    )
}

fn mex_document() -> String {
    format!(
        r##"<wsdl:definitions
            xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"
            xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy"
            xmlns:sp="http://docs.oasis-open.org/ws-sx/ws-securitypolicy/200702"
            xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"
            xmlns:soap12="http://schemas.xmlsoap.org/wsdl/soap12/"
            xmlns:tns="http://tempuri.org/">
        <wsp:Policy wsu:Id="UserNameWsTrustBinding_IWSTrust13Async_policy">
            <wsp:ExactlyOne><wsp:All>
                <sp:SignedSupportingTokens><wsp:Policy>
                    <sp:UsernameToken><wsp:Policy>
                        <sp:WssUsernameToken10/>
                    </wsp:Policy></sp:UsernameToken>
                </wsp:Policy></sp:SignedSupportingTokens>
            </wsp:All></wsp:ExactlyOne>
        </wsp:Policy>
        <wsdl:binding name="UserNameWsTrustBinding_IWSTrust13Async" type="tns:IWSTrust13Async">
            <wsp:PolicyReference URI="#UserNameWsTrustBinding_IWSTrust13Async_policy"/>
        </wsdl:binding>
        <wsdl:service name="SecurityTokenService">
            <wsdl:port name="UserNameWsTrustBinding_IWSTrust13Async"
                       binding="tns:UserNameWsTrustBinding_IWSTrust13Async">
                <soap12:address location="{WSTRUST_URL}"/>
            </wsdl:port>
        </wsdl:service>
    </wsdl:definitions>"##
    )
}

fn rstr_document() -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <trust:RequestSecurityTokenResponseCollection xmlns:trust="http://docs.oasis-open.org/ws-sx/ws-trust/200512">
      <trust:RequestSecurityTokenResponse>
        <trust:TokenType>urn:oasis:names:tc:SAML:2.0:assertion</trust:TokenType>
        <trust:RequestedSecurityToken>{ASSERTION}</trust:RequestedSecurityToken>
      </trust:RequestSecurityTokenResponse>
    </trust:RequestSecurityTokenResponseCollection>
  </s:Body>
</s:Envelope>"#
    )
}

/// Scripted transport: each URL maps to a canned GET body; SOAP POSTs are
/// recorded and answered with a canned RSTR.
#[derive(Default)]
struct ScriptedTransport {
    get_bodies: HashMap<String, String>,
    get_calls: AtomicUsize,
    soap_calls: AtomicUsize,
    last_soap: Mutex<Option<(String, String, String)>>,
    rstr: Option<String>,
}

impl ScriptedTransport {
    fn federated() -> Self {
        let mut transport = Self::default();
        transport.get_bodies.insert(
            format!("https://login.microsoftonline.com/common/userrealm/{USERNAME}?api-version=1.0"),
            realm_json("Federated"),
        );
        transport
            .get_bodies
            .insert(MEX_URL.to_string(), mex_document());
        transport.rstr = Some(rstr_document());
        transport
    }

    fn managed() -> Self {
        let mut transport = Self::default();
        transport.get_bodies.insert(
            format!("https://login.microsoftonline.com/common/userrealm/{USERNAME}?api-version=1.0"),
            realm_json("Managed"),
        );
        transport
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<String> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_bodies
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| AuthError::transport(format!("unexpected GET {url}")))
    }

    async fn post_soap(&self, url: &Url, action: &str, body: String) -> Result<String> {
        self.soap_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_soap.lock().unwrap() =
            Some((url.to_string(), action.to_string(), body));
        self.rstr
            .clone()
            .ok_or_else(|| AuthError::transport(format!("unexpected SOAP POST {url}")))
    }
}

#[tokio::test]
async fn federated_flow_produces_assertion_params() {
    let transport = ScriptedTransport::federated();
    let credential = UserCredential::new(USERNAME, PASSWORD);

    assert_eq!(
        credential.account_type(&transport).await.unwrap(),
        AccountType::Federated
    );

    let params = credential.request_params(&transport).await.unwrap();
    let form = params.into_form();
    let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, ["assertion", "grant_type", "scope"]);

    let assertion = &form[0].1;
    assert_eq!(BASE64.decode(assertion).unwrap(), ASSERTION.as_bytes());
    assert_eq!(form[1].1, "urn:ietf:params:oauth:grant-type:saml2-bearer");
    assert_eq!(form[2].1, "openid");
}

#[tokio::test]
async fn federated_flow_addresses_the_resolved_endpoint() {
    let transport = ScriptedTransport::federated();
    let credential = UserCredential::new(USERNAME, PASSWORD);
    credential.request_params(&transport).await.unwrap();

    let (url, action, body) = transport.last_soap.lock().unwrap().clone().unwrap();
    assert_eq!(url, WSTRUST_URL);
    assert_eq!(
        action,
        "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RST/Issue"
    );
    assert!(body.contains("<wsse:Username>user@contoso.com</wsse:Username>"));
    assert!(body.contains("<wsse:Password>hunter2</wsse:Password>"));
}

#[tokio::test]
async fn federated_handshake_is_redone_on_every_request() {
    let transport = ScriptedTransport::federated();
    let credential = UserCredential::new(USERNAME, PASSWORD);
    credential.request_params(&transport).await.unwrap();
    credential.request_params(&transport).await.unwrap();

    // One realm discovery (cached), but two mex fetches and two exchanges:
    // assertions are single-use.
    assert_eq!(transport.get_calls.load(Ordering::SeqCst), 3);
    assert_eq!(transport.soap_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn managed_flow_needs_no_network_beyond_discovery() {
    let transport = ScriptedTransport::managed();
    let credential = UserCredential::new(USERNAME, PASSWORD);

    let params = credential.request_params(&transport).await.unwrap();
    assert_eq!(
        params,
        TokenRequestParams::Managed {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
        }
    );
    assert_eq!(transport.get_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.soap_calls.load(Ordering::SeqCst), 0);

    let form = params.into_form();
    let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, ["username", "password", "grant_type", "scope"]);
}

#[tokio::test]
async fn unrecognized_mex_binding_fails_at_the_exchange_stage() {
    let mut transport = ScriptedTransport::federated();
    let mex = mex_document().replace("UserNameWsTrustBinding_IWSTrust13Async", "HomeGrownBinding");
    transport.get_bodies.insert(MEX_URL.to_string(), mex);

    let credential = UserCredential::new(USERNAME, PASSWORD);
    let error = credential.request_params(&transport).await.unwrap_err();
    assert!(matches!(error, AuthError::Configuration { .. }));
    assert_eq!(transport.soap_calls.load(Ordering::SeqCst), 0);
}
