//! Request parameters, normalized into strings, lists and maps.

use crate::error::ParamsError;
use crate::RequestHeader;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Str(String),
    List(Vec<Param>),
    Map(Params),
    /// An uploaded file handle, passed through as received.
    Upload(Value),
}

impl Param {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Param]> {
        match self {
            Param::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Params> {
        match self {
            Param::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

pub type Params = BTreeMap<String, Param>;

type UploadPredicate = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

/// Decides whether a parameter object is a file upload handle.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadDetector {
    /// Objects carrying `tempfile` and `filename`, as produced by multipart decoding.
    #[default]
    Multipart,
    /// Objects carrying `original_filename` and `local_path`, as produced by test uploads.
    Test,
    #[serde(skip)]
    Custom(UploadPredicate),
}

impl UploadDetector {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        UploadDetector::Custom(Arc::new(f))
    }

    pub fn is_upload(&self, object: &Map<String, Value>) -> bool {
        match self {
            UploadDetector::Multipart => object.contains_key("tempfile") && object.contains_key("filename"),
            UploadDetector::Test => object.contains_key("original_filename") && object.contains_key("local_path"),
            UploadDetector::Custom(predicate) => predicate(object),
        }
    }
}

impl fmt::Debug for UploadDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadDetector::Multipart => f.write_str("Multipart"),
            UploadDetector::Test => f.write_str("Test"),
            UploadDetector::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Normalizes a decoded value: sequences and objects recurse, upload objects pass through,
/// other leaves become strings and `null` becomes the empty string.
pub fn normalize(value: Value, detector: &UploadDetector) -> Param {
    match value {
        Value::Null => Param::Str(String::new()),
        Value::String(value) => Param::Str(value),
        Value::Bool(value) => Param::Str(value.to_string()),
        Value::Number(value) => Param::Str(value.to_string()),
        Value::Array(values) => Param::List(values.into_iter().map(|value| normalize(value, detector)).collect()),
        Value::Object(object) if detector.is_upload(&object) => Param::Upload(Value::Object(object)),
        Value::Object(object) => {
            Param::Map(object.into_iter().map(|(key, value)| (key, normalize(value, detector))).collect())
        }
    }
}

/// Collects the parameters of a request.
///
/// Sources are merged in order, later ones overriding earlier keys: the query string, a form
/// or JSON object body, the named route captures and finally `splat`, the wildcard captures.
pub fn collect(
    req: &RequestHeader,
    body: &Bytes,
    captures: &[(String, String)],
    wildcards: &[String],
    detector: &UploadDetector,
) -> Result<Params, ParamsError> {
    let mut merged = Map::new();

    if let Some(query) = req.query().filter(|query| !query.is_empty()) {
        let parsed = serde_qs::from_str::<Map<String, Value>>(query).map_err(|e| {
            warn!(query, error = %e, "malformed query string");
            ParamsError::invalid_query(e)
        })?;
        merged.extend(parsed);
    }

    if !body.is_empty() {
        match body_kind(req) {
            Some(BodyKind::Form) => {
                let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body).map_err(|e| {
                    warn!(error = %e, "malformed form body");
                    ParamsError::invalid_form(e)
                })?;
                merged.extend(pairs.into_iter().map(|(key, value)| (key, Value::String(value))));
            }
            Some(BodyKind::Json) => {
                let value = serde_json::from_slice::<Value>(body).map_err(|e| {
                    warn!(error = %e, "malformed json body");
                    ParamsError::from(e)
                })?;
                if let Value::Object(object) = value {
                    merged.extend(object);
                }
            }
            None => {}
        }
    }

    merged.extend(captures.iter().map(|(key, value)| (key.clone(), Value::String(value.clone()))));
    if !wildcards.is_empty() {
        merged.insert("splat".to_string(), Value::Array(wildcards.iter().cloned().map(Value::String).collect()));
    }

    Ok(merged.into_iter().map(|(key, value)| (key, normalize(value, detector))).collect())
}

enum BodyKind {
    Form,
    Json,
}

fn body_kind(req: &RequestHeader) -> Option<BodyKind> {
    let mime = req
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())?;

    if mime.type_() != mime::APPLICATION {
        return None;
    }
    if mime.subtype() == mime::WWW_FORM_URLENCODED {
        Some(BodyKind::Form)
    } else if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
        Some(BodyKind::Json)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{collect, normalize, Param, UploadDetector};
    use crate::error::ParamsError;
    use crate::RequestHeader;
    use bytes::Bytes;
    use http::Request;
    use serde_json::json;

    fn request(uri: &str, content_type: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        builder.body(()).unwrap().into()
    }

    #[test]
    fn test_normalize_leaves() {
        let detector = UploadDetector::default();
        let value = json!({"n": 1, "b": true, "z": null, "s": "x", "l": [1, "two", {"k": 3.5}]});

        let Param::Map(map) = normalize(value, &detector) else { panic!("expected a map") };
        assert_eq!(map["n"], Param::from("1"));
        assert_eq!(map["b"], Param::from("true"));
        assert_eq!(map["z"], Param::from(""));
        assert_eq!(map["s"], Param::from("x"));

        let list = map["l"].as_list().unwrap();
        assert_eq!(list[0], Param::from("1"));
        assert_eq!(list[1], Param::from("two"));
        assert_eq!(list[2].get("k"), Some(&Param::from("3.5")));
    }

    #[test]
    fn test_upload_detectors() {
        let multipart = json!({"filename": "a.png", "tempfile": "/tmp/x", "type": "image/png"});
        let test_upload = json!({"original_filename": "a.png", "local_path": "/tmp/y"});

        assert_eq!(normalize(multipart.clone(), &UploadDetector::Multipart), Param::Upload(multipart.clone()));
        assert!(matches!(normalize(test_upload.clone(), &UploadDetector::Multipart), Param::Map(_)));

        assert_eq!(normalize(test_upload.clone(), &UploadDetector::Test), Param::Upload(test_upload));
        assert!(matches!(normalize(multipart, &UploadDetector::Test), Param::Map(_)));

        let custom = UploadDetector::custom(|object| object.contains_key("blob"));
        assert!(matches!(normalize(json!({"blob": 1}), &custom), Param::Upload(_)));
    }

    #[test]
    fn test_detector_from_config() {
        let detector: UploadDetector = serde_json::from_str("\"test\"").unwrap();
        assert!(matches!(detector, UploadDetector::Test));
    }

    #[test]
    fn test_collect_sources() {
        let req = request("/items/7?page=2&tags[]=a&tags[]=b&user[name]=ann&id=0", Some("application/x-www-form-urlencoded"));
        let body = Bytes::from_static(b"title=hello+world&page=3");
        let captures = [("id".to_string(), "7".to_string())];
        let wildcards = ["x/y".to_string()];

        let params = collect(&req, &body, &captures, &wildcards, &UploadDetector::default()).unwrap();

        assert_eq!(params["page"], Param::from("3"));
        assert_eq!(params["id"], Param::from("7"));
        assert_eq!(params["title"], Param::from("hello world"));
        assert_eq!(params["tags"], Param::List(vec!["a".into(), "b".into()]));
        assert_eq!(params["user"].get("name"), Some(&Param::from("ann")));
        assert_eq!(params["splat"], Param::List(vec!["x/y".into()]));
    }

    #[test]
    fn test_collect_json_body() {
        let req = request("/items", Some("application/json; charset=utf-8"));
        let body = Bytes::from_static(br#"{"count": 2, "file": {"tempfile": "/tmp/a", "filename": "a.txt"}}"#);

        let params = collect(&req, &body, &[], &[], &UploadDetector::Multipart).unwrap();

        assert_eq!(params["count"], Param::from("2"));
        assert!(matches!(params["file"], Param::Upload(_)));
    }

    #[test]
    fn test_collect_errors() {
        let req = request("/items", Some("application/json"));
        let err = collect(&req, &Bytes::from_static(b"{oops"), &[], &[], &UploadDetector::default()).unwrap_err();
        assert!(matches!(err, ParamsError::InvalidJson { .. }));

        let req = request("/items", Some("text/plain"));
        let params = collect(&req, &Bytes::from_static(b"{oops"), &[], &[], &UploadDetector::default()).unwrap();
        assert!(params.is_empty());
    }
}
