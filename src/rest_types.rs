use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every JSON reply from the files API wraps its payload in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeRequest<'a> {
    pub content_type: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMultipartUploadResponse {
    pub file_id: Option<String>,
    pub upload_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlResponse {
    pub upload_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeFile<'a> {
    pub content_type: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeMultipartRequest<'a> {
    pub file: FinalizeFile<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeResponse {
    pub file: Option<StoredObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadUrlsRequest<'a> {
    pub files: Vec<FinalizeFile<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsResponse {
    #[serde(default)]
    pub upload_params: Vec<UploadParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParam {
    pub file_id: String,
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSimpleFile<'a> {
    pub file_id: &'a str,
    pub content_type: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub recorder_name: Option<&'a str>,
    pub recorder_email: Option<&'a str>,
    pub needs_conversion: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeSimpleRequest<'a> {
    pub file: FinalizeSimpleFile<'a>,
}

/// The committed, server-side object returned by finalize.
///
/// Some replies carry the id as `_id` or `id` (often both) instead of
/// `fileId`. Those keys stay in `extra` and only fill in `file_id` when
/// `fileId` is absent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", from = "RawStoredObject")]
pub struct StoredObject {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub name: String,
    /// Fields assigned by the remote, such as a public URL.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStoredObject {
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawStoredObject> for StoredObject {
    fn from(raw: RawStoredObject) -> Self {
        let file_id = raw
            .file_id
            .filter(|id| !id.is_empty())
            .or_else(|| {
                ["_id", "id"]
                    .iter()
                    .find_map(|key| raw.extra.get(*key).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Self {
            file_id,
            content_type: raw.content_type,
            name: raw.name,
            extra: raw.extra,
        }
    }
}
