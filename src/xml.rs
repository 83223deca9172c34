//! Namespace-aware XML tree with a small declarative query layer.
//!
//! MEX documents mix WSDL, WS-Policy and WS-SecurityPolicy vocabularies, and
//! every query here matches on the exact namespace URI rather than the
//! prefix. A prefix bound to the wrong URI therefore yields zero matches,
//! which surfaces at the parsing stage as "nothing found" rather than as an
//! XML error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::errors::{AuthError, Result};

/// Exact namespace URIs used across MEX and WS-Trust documents.
pub mod ns {
    /// WSDL definitions, bindings, services and ports.
    pub const WSDL: &str = "http://schemas.xmlsoap.org/wsdl/";
    /// WS-Policy.
    pub const WSP: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";
    /// WS-SecurityPolicy 1.2 (signed supporting tokens).
    pub const SP: &str = "http://docs.oasis-open.org/ws-sx/ws-securitypolicy/200702";
    /// Legacy WS-SecurityPolicy (signed and encrypted supporting tokens).
    pub const SSP: &str = "http://schemas.xmlsoap.org/ws/2005/07/securitypolicy";
    /// WS-Security utility (wsu:Id, timestamps).
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    /// WS-Security extensions (UsernameToken).
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    /// WS-Addressing.
    pub const WSA: &str = "http://www.w3.org/2005/08/addressing";
    /// SOAP 1.2 binding extension for WSDL.
    pub const SOAP12_WSDL: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
    /// SOAP 1.2 envelope.
    pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
    /// WS-Trust 1.3.
    pub const TRUST_13: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
    /// WS-Trust February 2005.
    pub const TRUST_2005: &str = "http://schemas.xmlsoap.org/ws/2005/02/trust";
}

/// A namespace-resolved attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Namespace URI, `None` for unprefixed attributes.
    pub namespace: Option<String>,
    /// Local name without prefix.
    pub local: String,
    /// Unescaped attribute value.
    pub value: String,
}

/// A namespace-resolved XML element.
///
/// The tree is transient: it is built for a single parse call and discarded
/// with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Namespace URI the element name resolves to, if any.
    pub namespace: Option<String>,
    /// Local name without prefix.
    pub local: String,
    /// Attributes, excluding namespace declarations.
    pub attrs: Vec<Attr>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Concatenated character data directly under this element.
    pub text: String,
}

impl Element {
    /// Parse a document into its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            match reader.read_event().map_err(AuthError::xml)? {
                Event::Start(start) => {
                    let element = build_element(&reader, &start)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = build_element(&reader, &start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&text.unescape().map_err(AuthError::xml)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| AuthError::xml("document has no root element"))
    }

    /// Whether this element has the given namespace URI and local name.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    /// Child elements matching the given namespace URI and local name.
    pub fn children_named<'e, 's>(
        &'e self,
        namespace: &'s str,
        local: &'s str,
    ) -> impl Iterator<Item = &'e Element> + use<'e, 's> {
        self.children.iter().filter(move |c| c.is(namespace, local))
    }

    /// First child element matching the given namespace URI and local name.
    pub fn child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.children_named(namespace, local).next()
    }

    /// Attribute value by namespace URI and local name.
    pub fn attr(&self, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.local == local && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    /// Whether a chain of `(namespace, local)` child steps exists below this
    /// element, considering every matching branch at each step.
    pub fn has_path(&self, steps: &[(&str, &str)]) -> bool {
        match steps.split_first() {
            None => true,
            Some((&(namespace, local), rest)) => self
                .children_named(namespace, local)
                .any(|child| child.has_path(rest)),
        }
    }

    /// This element and all elements below it, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Iterator returned by [`Element::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn build_element(reader: &NsReader<&[u8]>, start: &BytesStart) -> Result<Element> {
    let (resolve, local) = reader.resolve_element(start.name());

    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(AuthError::xml)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (attr_resolve, attr_local) = reader.resolve_attribute(attr.key);
        attrs.push(Attr {
            namespace: namespace_uri(attr_resolve),
            local: String::from_utf8_lossy(attr_local.as_ref()).into_owned(),
            value: attr.unescape_value().map_err(AuthError::xml)?.into_owned(),
        });
    }

    Ok(Element {
        namespace: namespace_uri(resolve),
        local: String::from_utf8_lossy(local.as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

// An unknown prefix resolves to no namespace, so queries simply fail to
// match; malformed namespace wiring is indistinguishable from an absent
// policy at the call sites.
fn namespace_uri(resolve: ResolveResult) -> Option<String> {
    match resolve {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    }
}
