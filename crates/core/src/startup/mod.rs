//! All-of join over the asset manifest, gating application start.

use futures::future::{try_join_all, AbortHandle, AbortRegistration, Abortable, Aborted};

use crate::{
    assets::{Asset, AssetEntry, AssetLoader, AssetManifest, AssetStore},
    HyperviewError, Result,
};

/// Waits for every declared asset before anything else is constructed.
///
/// Loads run concurrently. The first failure fails the whole barrier and
/// drops (cancels) the loads still in flight. The barrier can also be
/// cancelled from outside through [`StartupBarrier::cancel_handle`].
#[derive(Debug)]
pub struct StartupBarrier {
    manifest: AssetManifest,
    abort: AbortHandle,
    registration: AbortRegistration,
}

impl StartupBarrier {
    pub fn new(manifest: AssetManifest) -> Self {
        let (abort, registration) = AbortHandle::new_pair();
        Self {
            manifest,
            abort,
            registration,
        }
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Token that cancels the pending loads when aborted.
    pub fn cancel_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Resolves once every load succeeded, with the loaded assets by id.
    pub async fn when_all_ready(self, loader: &dyn AssetLoader) -> Result<AssetStore> {
        let Self {
            manifest,
            registration,
            ..
        } = self;
        manifest.validate()?;
        tracing::info!(assets = manifest.len(), "loading assets");

        let loads = manifest.entries.iter().map(|entry| load_one(loader, entry));
        match Abortable::new(try_join_all(loads), registration).await {
            Ok(Ok(assets)) => {
                tracing::info!(assets = assets.len(), "all assets ready");
                Ok(assets.into_iter().collect())
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "startup failed");
                Err(err)
            }
            Err(Aborted) => {
                tracing::warn!("startup cancelled");
                Err(HyperviewError::StartupCancelled)
            }
        }
    }
}

async fn load_one(loader: &dyn AssetLoader, entry: &AssetEntry) -> Result<(String, Asset)> {
    let asset = loader.load(entry).await.map_err(|err| match err {
        err @ HyperviewError::AssetLoad { .. } => err,
        other => HyperviewError::AssetLoad {
            id: entry.id.clone(),
            reason: other.to_string(),
        },
    })?;

    if asset.kind() != entry.kind {
        return Err(HyperviewError::AssetLoad {
            id: entry.id.clone(),
            reason: format!(
                "loader produced {} for a {} entry",
                asset.kind().name(),
                entry.kind.name()
            ),
        });
    }

    tracing::debug!(id = %entry.id, kind = entry.kind.name(), "asset ready");
    Ok((entry.id.clone(), asset))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::{
        executor::block_on,
        future::{self, FutureExt, LocalBoxFuture},
    };

    use super::*;
    use crate::assets::{AssetKind, ProceduralLoader};

    /// Succeeds for every entry except the ones listed as failing or stalled.
    #[derive(Default)]
    struct ScriptedLoader {
        failing: HashSet<&'static str>,
        stalled: HashSet<&'static str>,
        procedural: ProceduralLoader,
    }

    impl AssetLoader for ScriptedLoader {
        fn load<'a>(&'a self, entry: &'a AssetEntry) -> LocalBoxFuture<'a, Result<Asset>> {
            if self.stalled.contains(entry.id.as_str()) {
                return future::pending().boxed_local();
            }
            if self.failing.contains(entry.id.as_str()) {
                return future::ready(Err(HyperviewError::msg("404"))).boxed_local();
            }
            self.procedural.load(entry)
        }
    }

    #[test]
    fn resolves_with_every_asset() {
        let barrier = StartupBarrier::new(AssetManifest::standard());
        let store = block_on(barrier.when_all_ready(&ProceduralLoader::default())).unwrap();

        assert_eq!(store.len(), 6);
        assert!(store.video("overlay_attack").is_ok());
        assert!(store.mesh("dandruff_large_obj").is_ok());
    }

    #[test]
    fn one_failure_fails_the_barrier() {
        let loader = ScriptedLoader {
            failing: HashSet::from(["overlay_zfighting"]),
            ..Default::default()
        };
        let barrier = StartupBarrier::new(AssetManifest::standard());

        let err = block_on(barrier.when_all_ready(&loader)).unwrap_err();
        match err {
            HyperviewError::AssetLoad { id, reason } => {
                assert_eq!(id, "overlay_zfighting");
                assert_eq!(reason, "404");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failure_does_not_wait_for_stalled_siblings() {
        let loader = ScriptedLoader {
            failing: HashSet::from(["dandruff_small_tex"]),
            stalled: HashSet::from(["graphs", "overlay_attack"]),
            ..Default::default()
        };
        let barrier = StartupBarrier::new(AssetManifest::standard());

        let result = block_on(barrier.when_all_ready(&loader));
        assert!(matches!(result, Err(HyperviewError::AssetLoad { id, .. }) if id == "dandruff_small_tex"));
    }

    #[test]
    fn cancellation_aborts_pending_loads() {
        let loader = ScriptedLoader {
            stalled: HashSet::from(["graphs"]),
            ..Default::default()
        };
        let barrier = StartupBarrier::new(AssetManifest::standard());
        barrier.cancel_handle().abort();

        let result = block_on(barrier.when_all_ready(&loader));
        assert!(matches!(result, Err(HyperviewError::StartupCancelled)));
    }

    #[test]
    fn kind_mismatch_is_a_load_failure() {
        struct WrongKind;
        impl AssetLoader for WrongKind {
            fn load<'a>(&'a self, _: &'a AssetEntry) -> LocalBoxFuture<'a, Result<Asset>> {
                future::ready(Ok(Asset::Data(serde_json::Value::Null))).boxed_local()
            }
        }

        let manifest = AssetManifest {
            entries: vec![AssetEntry::new("clip", AssetKind::Video, "clip.mp4")],
        };
        let err = block_on(StartupBarrier::new(manifest).when_all_ready(&WrongKind)).unwrap_err();
        assert!(format!("{err}").contains("loader produced data for a video entry"));
    }

    #[test]
    fn empty_manifest_resolves_immediately() {
        let barrier = StartupBarrier::new(AssetManifest::default());
        let store = block_on(barrier.when_all_ready(&ProceduralLoader::default())).unwrap();
        assert!(store.is_empty());
    }
}
