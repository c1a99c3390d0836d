use bytes::Bytes;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub uri: String,
    pub data: Bytes,
    pub media_type: Option<String>,
}

impl Asset {
    pub fn new(uri: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Asset {
            uri: uri.into(),
            data: data.into(),
            media_type: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchAssetOptions {
    // Used to resolve `package://` URIs relative to the document that referenced them
    pub reference_url: Option<String>,
    pub cancellation: Option<CancellationToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub session_token: String,
}
