//! The resolved endpoint produced by a successful resolution.

use std::collections::HashMap;

use crate::value::TypedValue;

/// A resolved endpoint: a URL plus optional headers and properties.
///
/// `headers` ordering is not guaranteed by this crate (§9 open question);
/// compare as sets in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// The resolved URL string.
    pub uri: String,
    /// Header name to value-list, if the result fragment supplied any.
    pub headers: Option<HashMap<String, Vec<String>>>,
    /// Arbitrary resolved properties, if the result fragment supplied any.
    pub properties: Option<HashMap<String, TypedValue>>,
}

impl Endpoint {
    /// Builds an endpoint with no headers or properties.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: None,
            properties: None,
        }
    }
}

/// A mutable builder handed to [`crate::context::Extension`]s after a
/// result fragment runs, and materialized into an [`Endpoint`] once every
/// extension has had a chance to inspect or trim it.
#[derive(Debug, Default, Clone)]
pub struct EndpointBuilder {
    uri: String,
    headers: HashMap<String, Vec<String>>,
    properties: HashMap<String, TypedValue>,
}

impl EndpointBuilder {
    /// Starts a builder for the given resolved URL.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    /// Merges in headers produced by the result fragment.
    pub fn with_headers(mut self, headers: HashMap<String, Vec<String>>) -> Self {
        self.headers = headers;
        self
    }

    /// Merges in properties produced by the result fragment.
    pub fn with_properties(mut self, properties: HashMap<String, TypedValue>) -> Self {
        self.properties = properties;
        self
    }

    /// The URL currently staged for this endpoint.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Mutable access to the staged headers, for extensions to trim or add.
    pub fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
        &mut self.headers
    }

    /// Mutable access to the staged properties, for extensions to trim or
    /// add.
    pub fn properties_mut(&mut self) -> &mut HashMap<String, TypedValue> {
        &mut self.properties
    }

    /// Consumes the builder, producing the final [`Endpoint`]. Empty
    /// headers/properties collapse to `None`.
    pub fn build(self) -> Endpoint {
        Endpoint {
            uri: self.uri,
            headers: if self.headers.is_empty() { None } else { Some(self.headers) },
            properties: if self.properties.is_empty() { None } else { Some(self.properties) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collections_collapse_to_none() {
        let endpoint = EndpointBuilder::new("https://x/").build();
        assert_eq!(endpoint.headers, None);
        assert_eq!(endpoint.properties, None);
    }

    #[test]
    fn non_empty_collections_survive_build() {
        let mut builder = EndpointBuilder::new("https://x/");
        builder.headers_mut().insert("x-foo".into(), vec!["bar".into()]);
        let endpoint = builder.build();
        assert!(endpoint.headers.unwrap().contains_key("x-foo"));
    }
}
