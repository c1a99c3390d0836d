pub mod cache;
pub mod credentials;
pub mod http_client;
pub mod object_storage;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use url::Url;

use pipeline_core::{
    asset_cache_repository::AssetCacheRepository,
    constants::{PACKAGE_SCHEME, S3_SCHEME, player_capabilities::ASSETS},
    error::PipelineError,
    http_client_repository::HttpClientRepository,
    models::asset::{Asset, FetchAssetOptions},
    object_storage_repository::ObjectStorageRepository,
    player::Player,
    security_token_repository::SecurityTokenRepository,
};

use crate::modules::{
    asset_fetcher::{cache::TtlAssetCache, credentials::CredentialProvider, http_client::ReqwestHttpClient},
    config::MessagePipelineConfig,
};

struct ObjectStorage {
    credentials: CredentialProvider,
    repository: Arc<dyn ObjectStorageRepository>,
}

/// Resolves asset URIs through the source that can serve them:
/// object storage for `s3://`, the player or a package mirror for
/// `package://`, plain HTTP for everything else.
pub struct AssetFetcher {
    http_client: Arc<dyn HttpClientRepository>,
    cache: Option<Arc<dyn AssetCacheRepository>>,
    object_storage: Option<ObjectStorage>,
    can_fetch_package_urls: bool,
}

async fn cancellable<T, F>(cancellation: Option<&CancellationToken>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancellation {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(PipelineError::Cancelled.into()),
            result = future => result,
        },
        None => future.await,
    }
}

fn is_cancelled(cancellation: Option<&CancellationToken>) -> bool {
    cancellation.is_some_and(|token| token.is_cancelled())
}

/// Rewrites `package://<pkg>/<path>` against a reference URL that contains
/// `<pkg>`, e.g. `https://host/ws/robot/urdf/robot.urdf` resolves
/// `package://robot/meshes/arm.stl` to `https://host/ws/robot/meshes/arm.stl`.
/// Matching is textual, so a package name that appears elsewhere in the
/// reference URL resolves against the wrong prefix.
pub(crate) fn resolve_package_url(package_url: &Url, reference_url: &str) -> Option<String> {
    let package = package_url.host_str()?;
    let package_end = reference_url.rfind(package)? + package.len();

    Some(format!(
        "{}{}",
        &reference_url[..package_end],
        package_url.path()
    ))
}

impl AssetFetcher {
    pub fn new(http_client: Arc<dyn HttpClientRepository>, can_fetch_package_urls: bool) -> Self {
        AssetFetcher {
            http_client,
            cache: None,
            object_storage: None,
            can_fetch_package_urls,
        }
    }

    /// HTTP through reqwest with an in-memory cache sized by `config`.
    pub fn from_config(config: &MessagePipelineConfig) -> Self {
        AssetFetcher::new(Arc::new(ReqwestHttpClient::new()), config.can_fetch_package_urls).with_cache(
            Arc::new(TtlAssetCache::new(config.asset_cache_capacity, config.asset_cache_ttl)),
        )
    }

    pub fn with_cache(mut self, cache: Arc<dyn AssetCacheRepository>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_object_storage(
        mut self,
        security_token_repository: Arc<dyn SecurityTokenRepository>,
        object_storage_repository: Arc<dyn ObjectStorageRepository>,
        credential_expire_duration: Duration,
    ) -> Self {
        self.object_storage = Some(ObjectStorage {
            credentials: CredentialProvider::new(
                security_token_repository,
                credential_expire_duration,
            ),
            repository: object_storage_repository,
        });
        self
    }

    pub async fn fetch_asset(
        &self,
        uri: &str,
        options: FetchAssetOptions,
        player: Option<&Arc<dyn Player>>,
        player_capabilities: &[String],
    ) -> Result<Asset> {
        let url = Url::parse(uri).map_err(|_| PipelineError::InvalidUri(uri.to_string()))?;
        let cancellation = options.cancellation.as_ref();

        match url.scheme() {
            S3_SCHEME => self.fetch_object(uri, &url, cancellation).await,
            PACKAGE_SCHEME => {
                self.fetch_package(uri, &url, &options, player, player_capabilities)
                    .await
            }
            _ => self.fetch_http(uri, cancellation).await,
        }
    }

    async fn cached(&self, uri: &str) -> Option<Asset> {
        let cache = self.cache.as_ref()?;
        if !cache.check_uri_needs_cache(uri) {
            return None;
        }
        match cache.get(uri.to_string()).await {
            Ok(Some(data)) => {
                tracing::trace!(uri, "asset cache hit");
                Some(Asset::new(uri, data))
            }
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(uri, "asset cache lookup failed: {:?}", err);
                None
            }
        }
    }

    async fn store(&self, asset: &Asset) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if !cache.check_uri_needs_cache(&asset.uri) {
            return;
        }
        if let Err(err) = cache.set(asset.uri.clone(), asset.data.clone()).await {
            tracing::debug!(uri = %asset.uri, "asset cache store failed: {:?}", err);
        }
    }

    async fn fetch_object(
        &self,
        uri: &str,
        url: &Url,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Asset> {
        if let Some(asset) = self.cached(uri).await {
            return Ok(asset);
        }

        let Some(object_storage) = self.object_storage.as_ref() else {
            return Err(PipelineError::UnsupportedCapability(format!("{S3_SCHEME}:// assets")).into());
        };
        let project = url
            .host_str()
            .ok_or_else(|| PipelineError::InvalidUri(uri.to_string()))?;
        let key = url.path().trim_start_matches('/');

        let data = cancellable(cancellation, async {
            let token = object_storage.credentials.get(project).await?;
            object_storage
                .repository
                .get_object(token, project.to_string(), key.to_string())
                .await
        })
        .await?;

        let asset = Asset::new(uri, data);
        self.store(&asset).await;
        Ok(asset)
    }

    async fn fetch_package(
        &self,
        uri: &str,
        url: &Url,
        options: &FetchAssetOptions,
        player: Option<&Arc<dyn Player>>,
        player_capabilities: &[String],
    ) -> Result<Asset> {
        let cancellation = options.cancellation.as_ref();

        if let Some(player) = player {
            if player_capabilities.iter().any(|c| c == ASSETS) {
                if let Some(asset) = self.cached(uri).await {
                    return Ok(asset);
                }
                match player
                    .fetch_asset(uri.to_string(), options.cancellation.clone())
                    .await
                {
                    Ok(asset) => {
                        self.store(&asset).await;
                        return Ok(asset);
                    }
                    Err(err) => tracing::debug!(uri, "player failed to fetch asset: {:?}", err),
                }
            }
        }
        if is_cancelled(cancellation) {
            return Err(PipelineError::Cancelled.into());
        }

        if self.can_fetch_package_urls {
            match self.fetch_http(uri, cancellation).await {
                Ok(asset) => return Ok(asset),
                Err(err) => tracing::debug!(uri, "direct package fetch failed: {:?}", err),
            }
        }
        if is_cancelled(cancellation) {
            return Err(PipelineError::Cancelled.into());
        }

        if let Some(resolved) = options
            .reference_url
            .as_deref()
            .and_then(|reference_url| resolve_package_url(url, reference_url))
        {
            match self.fetch_http(&resolved, cancellation).await {
                Ok(asset) => return Ok(asset),
                Err(err) => {
                    tracing::debug!(uri, %resolved, "relative package fetch failed: {:?}", err)
                }
            }
        }
        if is_cancelled(cancellation) {
            return Err(PipelineError::Cancelled.into());
        }

        tracing::error!(uri, "asset could not be loaded from any source");
        Err(PipelineError::AssetNotFound(uri.to_string()).into())
    }

    async fn fetch_http(&self, uri: &str, cancellation: Option<&CancellationToken>) -> Result<Asset> {
        let response = cancellable(cancellation, self.http_client.get(uri.to_string())).await?;

        if !response.is_success() {
            return Err(PipelineError::HttpStatus {
                uri: uri.to_string(),
                status: response.status,
                status_text: response.status_text,
            }
            .into());
        }

        Ok(Asset {
            uri: uri.to_string(),
            data: response.body,
            media_type: response.media_type,
        })
    }
}

#[cfg(test)]
mod success {
    use std::{sync::Arc, time::Duration};

    use bytes::Bytes;
    use pipeline_core::{
        asset_cache_repository::MockAssetCacheRepository,
        constants::player_capabilities::ASSETS,
        http_client_repository::{HttpResponse, MockHttpClientRepository},
        models::asset::{Asset, FetchAssetOptions, SecurityToken},
        object_storage_repository::MockObjectStorageRepository,
        player::{MockPlayer, Player},
        security_token_repository::MockSecurityTokenRepository,
    };
    use url::Url;

    use crate::modules::asset_fetcher::{AssetFetcher, cache::TtlAssetCache, resolve_package_url};

    fn ok_response(body: &'static [u8]) -> HttpResponse {
        HttpResponse {
            status: 200,
            status_text: "OK".to_string(),
            media_type: Some("model/stl".to_string()),
            body: Bytes::from_static(body),
        }
    }

    fn token() -> SecurityToken {
        SecurityToken {
            endpoint: "https://storage.example.com".to_string(),
            access_key_id: "id".to_string(),
            access_key_secret: "secret".to_string(),
            session_token: "session".to_string(),
        }
    }

    #[tokio::test]
    async fn http_uri_is_fetched_directly() {
        let mut http_client = MockHttpClientRepository::new();
        http_client
            .expect_get()
            .withf(|url| url == "https://example.com/mesh.stl")
            .times(1)
            .returning(|_| Ok(ok_response(b"solid")));

        let fetcher = AssetFetcher::new(Arc::new(http_client), false);
        let asset = fetcher
            .fetch_asset("https://example.com/mesh.stl", FetchAssetOptions::default(), None, &[])
            .await
            .unwrap();

        assert_eq!(asset.data, Bytes::from_static(b"solid"));
        assert_eq!(asset.media_type.as_deref(), Some("model/stl"));
    }

    #[tokio::test]
    async fn object_credentials_are_reused_per_project() {
        let mut tokens = MockSecurityTokenRepository::new();
        let mut seq = mockall::Sequence::new();
        tokens
            .expect_generate_security_token()
            .withf(|project, _| project == "proj")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(token()));
        tokens
            .expect_generate_security_token()
            .withf(|project, _| project == "other")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(token()));

        let mut storage = MockObjectStorageRepository::new();
        storage
            .expect_get_object()
            .times(3)
            .returning(|_, _, key| Ok(Bytes::from(key)));

        let mut cache = MockAssetCacheRepository::new();
        cache.expect_check_uri_needs_cache().return_const(true);
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_set().times(3).returning(|_, _| Ok(()));

        let fetcher = AssetFetcher::new(Arc::new(MockHttpClientRepository::new()), false)
            .with_cache(Arc::new(cache))
            .with_object_storage(Arc::new(tokens), Arc::new(storage), Duration::from_secs(3600));

        let first = fetcher
            .fetch_asset("s3://proj/key", FetchAssetOptions::default(), None, &[])
            .await
            .unwrap();
        let _ = fetcher
            .fetch_asset("s3://proj/other-key", FetchAssetOptions::default(), None, &[])
            .await
            .unwrap();
        let _ = fetcher
            .fetch_asset("s3://other/key", FetchAssetOptions::default(), None, &[])
            .await
            .unwrap();

        assert_eq!(first.data, Bytes::from_static(b"key"));
    }

    #[tokio::test]
    async fn object_is_served_from_cache() {
        let cache = Arc::new(TtlAssetCache::new(8, Duration::from_secs(60)));
        let mut tokens = MockSecurityTokenRepository::new();
        tokens
            .expect_generate_security_token()
            .times(1)
            .returning(|_, _| Ok(token()));
        let mut storage = MockObjectStorageRepository::new();
        storage
            .expect_get_object()
            .times(1)
            .returning(|_, _, _| Ok(Bytes::from_static(b"mesh")));

        let fetcher = AssetFetcher::new(Arc::new(MockHttpClientRepository::new()), false)
            .with_cache(cache)
            .with_object_storage(Arc::new(tokens), Arc::new(storage), Duration::from_secs(3600));

        for _ in 0..2 {
            let asset = fetcher
                .fetch_asset("s3://proj/mesh.stl", FetchAssetOptions::default(), None, &[])
                .await
                .unwrap();
            assert_eq!(asset.data, Bytes::from_static(b"mesh"));
        }
    }

    #[tokio::test]
    async fn package_is_fetched_from_player_with_assets_capability() {
        let mut player = MockPlayer::new();
        player
            .expect_fetch_asset()
            .times(1)
            .returning(|uri, _| Ok(Asset::new(uri, Bytes::from_static(b"from player"))));
        let player: Arc<dyn Player> = Arc::new(player);

        let fetcher = AssetFetcher::new(Arc::new(MockHttpClientRepository::new()), true);
        let asset = fetcher
            .fetch_asset(
                "package://robot/meshes/arm.stl",
                FetchAssetOptions::default(),
                Some(&player),
                &[ASSETS.to_string()],
            )
            .await
            .unwrap();

        assert_eq!(asset.data, Bytes::from_static(b"from player"));
    }

    #[tokio::test]
    async fn package_falls_back_to_reference_url() {
        let mut player = MockPlayer::new();
        player
            .expect_fetch_asset()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("not found")));
        let player: Arc<dyn Player> = Arc::new(player);

        let mut http_client = MockHttpClientRepository::new();
        let mut seq = mockall::Sequence::new();
        http_client
            .expect_get()
            .withf(|url| url == "package://robot/meshes/arm.stl")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("unsupported scheme")));
        http_client
            .expect_get()
            .withf(|url| url == "https://host/ws/robot/meshes/arm.stl")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_response(b"mirrored")));

        let fetcher = AssetFetcher::new(Arc::new(http_client), true);
        let options = FetchAssetOptions {
            reference_url: Some("https://host/ws/robot/urdf/robot.urdf".to_string()),
            ..Default::default()
        };
        let asset = fetcher
            .fetch_asset(
                "package://robot/meshes/arm.stl",
                options,
                Some(&player),
                &[ASSETS.to_string()],
            )
            .await
            .unwrap();

        assert_eq!(asset.uri, "https://host/ws/robot/meshes/arm.stl");
        assert_eq!(asset.data, Bytes::from_static(b"mirrored"));
    }

    #[test]
    fn resolve_package_url_uses_last_package_occurrence() {
        let url = Url::parse("package://robot/meshes/arm.stl").unwrap();

        assert_eq!(
            resolve_package_url(&url, "https://robot.example.com/robot/urdf/robot.urdf"),
            Some("https://robot.example.com/robot/meshes/arm.stl".to_string())
        );
        assert_eq!(resolve_package_url(&url, "https://example.com/other/a.urdf"), None);
    }
}
