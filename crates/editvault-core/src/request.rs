//! Replayable outbound request descriptors.

use serde::{Deserialize, Serialize};

/// Everything needed to replay an outbound request byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
    /// Header pairs in the order they were originally sent.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new("POST", url)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive lookup of the first header with `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Size of the body in bytes.
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_json_descriptor() {
        let req = RequestDescriptor::post_json("http://localhost/api/chat", &json!({"a": 1}));

        assert_eq!(req.method, "POST");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(req.body_len(), 7);
    }

    #[test]
    fn test_method_is_uppercased() {
        let req = RequestDescriptor::new("get", "http://localhost");
        assert_eq!(req.method, "GET");
        assert!(req.header("accept").is_none());
    }

    #[test]
    fn test_descriptor_survives_json() {
        let req = RequestDescriptor::new("PUT", "http://x")
            .with_header("x-one", "1")
            .with_header("x-two", "2")
            .with_body("payload");
        let json = serde_json::to_string(&req).unwrap();
        let back: RequestDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
