use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overrides the status code of a stubbed response (defaults to 200).
pub const ASSURED_STATUS: &str = "assured-status";
/// Delays a stubbed response by the given number of seconds.
pub const ASSURED_DELAY: &str = "assured-delay";
/// Correlates a stub with the callbacks registered for it.
pub const ASSURED_CALLBACK_KEY: &str = "assured-callback-key";
/// Destination URL of a callback.
pub const ASSURED_CALLBACK_TARGET: &str = "assured-callback-target";
/// Delays a callback by the given number of seconds.
pub const ASSURED_CALLBACK_DELAY: &str = "assured-callback-delay";
/// One base64 encoded response body variant of a stub; repeated once per variant, in order.
pub const ASSURED_ORDERED_BODY: &str = "assured-ordered-body";

const METADATA_HEADER_PREFIX: &str = "assured-";

/// Headers that describe the request carrying a registration rather than the stubbed response.
const TRANSPORT_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "user-agent",
    "accept",
    "accept-encoding",
    "connection",
    "transfer-encoding",
];

/// Removes leading and trailing slashes so that `/a/b/` and `a/b` address the same stub.
pub fn sanitize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Builds the `METHOD:path` key used to bucket stubs and made calls.
pub fn stub_key(method: &str, path: &str) -> String {
    format!("{}:{}", method, sanitize_path(path))
}

/// Returns true for `assured-*` headers, which are never replayed to clients or callback targets.
pub fn is_metadata_header(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with(METADATA_HEADER_PREFIX)
}

pub(crate) fn is_transport_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    TRANSPORT_HEADERS.contains(&name.as_str())
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

/// A stub definition: the response that is served whenever a request with the same method and
/// path is exercised.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedCall {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered_bodies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, with = "base64_bytes")]
    pub response: Bytes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<Callback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_key: Option<String>,
}

impl ExpectedCall {
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.response = body.into();
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Delays the response by `seconds` whenever this stub is served.
    pub fn delay(mut self, seconds: u64) -> Self {
        self.delay = seconds;
        self
    }

    pub fn query_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Makes the stub cycle through `bodies`, one per time it is served.
    pub fn ordered_bodies<I, S>(mut self, bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordered_bodies = Some(bodies.into_iter().map(Into::into).collect());
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Key used when managing stubbed and made calls.
    pub fn id(&self) -> String {
        stub_key(&self.method, &self.path)
    }
}

/// A template for an asynchronous request that is fired after the owning stub was served.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Callback {
    pub target: String,
    pub method: String,
    #[serde(default, with = "base64_bytes")]
    pub response: Bytes,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub delay: u64,
}

impl Callback {
    pub fn new<M: Into<String>, T: Into<String>>(method: M, target: T) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.response = body.into();
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn delay(mut self, seconds: u64) -> Self {
        self.delay = seconds;
        self
    }

    /// Converts the template into the call record that is dispatched under `callback_key`.
    pub(crate) fn to_call(&self, callback_key: &str) -> Call {
        let mut headers = self.headers.clone();
        headers.insert(ASSURED_CALLBACK_KEY.to_string(), callback_key.to_string());
        headers.insert(ASSURED_CALLBACK_TARGET.to_string(), self.target.clone());

        Call {
            method: self.method.clone(),
            path: String::new(),
            status_code: 0,
            response: self.response.clone(),
            headers,
            delay: self.delay,
            query: BTreeMap::new(),
        }
    }
}

/// A concrete call: either a served response that was logged for verification or a callback
/// payload waiting to be dispatched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Call {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, with = "base64_bytes")]
    pub response: Bytes,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub delay: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
}

impl Call {
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> String {
        stub_key(&self.method, &self.path)
    }

    /// Case-insensitive header lookup. Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn callback_key(&self) -> Option<&str> {
        self.header(ASSURED_CALLBACK_KEY)
    }

    pub fn callback_target(&self) -> Option<&str> {
        self.header(ASSURED_CALLBACK_TARGET)
    }

    /// Headers that are sent to clients and callback targets.
    pub fn replayable_headers(&self) -> impl Iterator<Item = (&String, &String)> {
        self.headers
            .iter()
            .filter(|(name, _)| !is_metadata_header(name))
    }
}

/// Encodes an ordered body variant as an `assured-ordered-body` header value, which cannot
/// carry arbitrary text.
pub fn encode_ordered_body(body: &str) -> String {
    STANDARD.encode(body)
}

/// Decodes an `assured-ordered-body` header value. `None` unless it is base64 encoded UTF-8.
pub fn decode_ordered_body(value: &str) -> Option<String> {
    let bytes = STANDARD.decode(value.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

/// JSON error body returned by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new<T: ToString>(message: &T) -> ErrorResponse {
        ErrorResponse {
            message: message.to_string(),
        }
    }
}

/// Bodies are transported as base64 strings so binary payloads survive JSON.
mod base64_bytes {
    use super::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
