use std::{
    collections::{HashMap, HashSet},
    f32::consts::PI,
    path::{Path, PathBuf},
    time::Duration,
};

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};

use crate::{
    raster::{Image, Rgb},
    HyperviewError, Result,
};

/// Kind of a declared asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Structured JSON data.
    Data,
    Video,
    Mesh,
    Texture,
}

impl AssetKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Video => "video",
            Self::Mesh => "mesh",
            Self::Texture => "texture",
        }
    }
}

/// One entry of the asset manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub id: String,
    pub kind: AssetKind,
    pub path: String,
}

impl AssetEntry {
    pub fn new(id: impl Into<String>, kind: AssetKind, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            path: path.into(),
        }
    }
}

/// Ordered list of assets that must be loaded before the application starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub entries: Vec<AssetEntry>,
}

impl AssetManifest {
    /// The assets the visualisation declares out of the box.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                AssetEntry::new("graphs", AssetKind::Data, "data/graphs.json"),
                AssetEntry::new("overlay_attack", AssetKind::Video, "texture/overlay_attack.mp4"),
                AssetEntry::new(
                    "overlay_zfighting",
                    AssetKind::Video,
                    "texture/overlay_zfighting.mp4",
                ),
                AssetEntry::new("dandruff_small_obj", AssetKind::Mesh, "data/dandruff_small.obj"),
                AssetEntry::new("dandruff_large_obj", AssetKind::Mesh, "data/dandruff_large.obj"),
                AssetEntry::new(
                    "dandruff_small_tex",
                    AssetKind::Texture,
                    "texture/dandruff_small.png",
                ),
            ],
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(source)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Rejects duplicate ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(HyperviewError::msg(format!(
                    "asset `{}` is declared more than once",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the manifest as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Looping sequence of decoded frames.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoClip {
    pub frames: Vec<Image>,
    pub frame_duration: Duration,
}

impl VideoClip {
    /// Frame shown at `time`, looping over the clip.
    pub fn frame_at(&self, time: Duration) -> Option<&Image> {
        if self.frames.is_empty() {
            return None;
        }
        if self.frame_duration.is_zero() {
            return self.frames.first();
        }
        let index = (time.as_nanos() / self.frame_duration.as_nanos()) as usize % self.frames.len();
        self.frames.get(index)
    }
}

/// Point cloud extracted from a mesh object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
}

/// A loaded asset.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Data(serde_json::Value),
    Video(VideoClip),
    Mesh(Mesh),
    Texture(Image),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Data(_) => AssetKind::Data,
            Self::Video(_) => AssetKind::Video,
            Self::Mesh(_) => AssetKind::Mesh,
            Self::Texture(_) => AssetKind::Texture,
        }
    }
}

/// Loaded assets by id, handed to the orchestrator at construction.
#[derive(Debug, Default)]
pub struct AssetStore {
    assets: HashMap<String, Asset>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, asset: Asset) {
        self.assets.insert(id.into(), asset);
    }

    pub fn get(&self, id: &str) -> Result<&Asset> {
        self.assets
            .get(id)
            .ok_or_else(|| HyperviewError::UnknownAsset(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn data(&self, id: &str) -> Result<&serde_json::Value> {
        match self.get(id)? {
            Asset::Data(value) => Ok(value),
            other => Err(mismatch(id, AssetKind::Data, other)),
        }
    }

    pub fn video(&self, id: &str) -> Result<&VideoClip> {
        match self.get(id)? {
            Asset::Video(clip) => Ok(clip),
            other => Err(mismatch(id, AssetKind::Video, other)),
        }
    }

    pub fn mesh(&self, id: &str) -> Result<&Mesh> {
        match self.get(id)? {
            Asset::Mesh(mesh) => Ok(mesh),
            other => Err(mismatch(id, AssetKind::Mesh, other)),
        }
    }

    pub fn texture(&self, id: &str) -> Result<&Image> {
        match self.get(id)? {
            Asset::Texture(image) => Ok(image),
            other => Err(mismatch(id, AssetKind::Texture, other)),
        }
    }
}

impl FromIterator<(String, Asset)> for AssetStore {
    fn from_iter<I: IntoIterator<Item = (String, Asset)>>(iter: I) -> Self {
        Self {
            assets: iter.into_iter().collect(),
        }
    }
}

fn mismatch(id: &str, expected: AssetKind, actual: &Asset) -> HyperviewError {
    HyperviewError::AssetKindMismatch {
        id: id.to_string(),
        expected: expected.name(),
        actual: actual.kind().name(),
    }
}

/// Asynchronous asset source. Decoding lives behind this seam.
pub trait AssetLoader {
    fn load<'a>(&'a self, entry: &'a AssetEntry) -> LocalBoxFuture<'a, Result<Asset>>;
}

/// Synthesises deterministic placeholder assets, seeded from each entry id.
#[derive(Debug, Clone)]
pub struct ProceduralLoader {
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for ProceduralLoader {
    fn default() -> Self {
        Self {
            frame_width: 64,
            frame_height: 36,
        }
    }
}

impl ProceduralLoader {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
        }
    }

    fn synthesize(&self, entry: &AssetEntry) -> Asset {
        let seed = seed_of(&entry.id);
        match entry.kind {
            AssetKind::Data => Asset::Data(serde_json::json!({
                "id": entry.id,
                "source": "procedural",
                "seed": seed,
            })),
            AssetKind::Video => Asset::Video(self.video(seed)),
            AssetKind::Mesh => Asset::Mesh(sphere_points(32 + (seed % 32) as usize)),
            AssetKind::Texture => Asset::Texture(checkerboard(8, hue_color(seed))),
        }
    }

    fn video(&self, seed: u32) -> VideoClip {
        let tint = hue_color(seed);
        let frames = (0..4)
            .map(|i| {
                let mut frame = Image::filled(self.frame_width, self.frame_height, Rgb::BLACK);
                let band = i * self.frame_height / 4;
                for y in band..(band + self.frame_height / 4).min(self.frame_height) {
                    for x in 0..self.frame_width {
                        frame.set(x, y, tint);
                    }
                }
                frame
            })
            .collect();
        VideoClip {
            frames,
            frame_duration: Duration::from_millis(1000 / 30),
        }
    }
}

impl AssetLoader for ProceduralLoader {
    fn load<'a>(&'a self, entry: &'a AssetEntry) -> LocalBoxFuture<'a, Result<Asset>> {
        async move { Ok(self.synthesize(entry)) }.boxed_local()
    }
}

/// Reads data assets from disk relative to `root`. Other kinds are handed to
/// the fallback loader.
pub struct FsLoader {
    root: PathBuf,
    fallback: Box<dyn AssetLoader>,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>, fallback: impl AssetLoader + 'static) -> Self {
        Self {
            root: root.into(),
            fallback: Box::new(fallback),
        }
    }

    fn read_data(&self, entry: &AssetEntry) -> Result<Asset> {
        let path = self.root.join(&entry.path);
        let source = std::fs::read_to_string(&path)?;
        Ok(Asset::Data(serde_json::from_str(&source)?))
    }
}

impl AssetLoader for FsLoader {
    fn load<'a>(&'a self, entry: &'a AssetEntry) -> LocalBoxFuture<'a, Result<Asset>> {
        match entry.kind {
            AssetKind::Data => async move { self.read_data(entry) }.boxed_local(),
            _ => self.fallback.load(entry),
        }
    }
}

impl std::fmt::Debug for FsLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsLoader").field("root", &self.root).finish()
    }
}

fn seed_of(id: &str) -> u32 {
    // FNV-1a
    id.bytes()
        .fold(0x811c_9dc5_u32, |hash, byte| (hash ^ byte as u32).wrapping_mul(0x0100_0193))
}

fn hue_color(seed: u32) -> Rgb {
    let hue = (seed % 360) as f32 / 360.0 * 2.0 * PI;
    Rgb::new(
        0.5 + 0.5 * hue.cos(),
        0.5 + 0.5 * (hue - 2.0 * PI / 3.0).cos(),
        0.5 + 0.5 * (hue + 2.0 * PI / 3.0).cos(),
    )
}

fn checkerboard(size: u32, color: Rgb) -> Image {
    let mut image = Image::filled(size, size, Rgb::BLACK);
    for y in 0..size {
        for x in 0..size {
            if (x + y) % 2 == 0 {
                image.set(x, y, color);
            }
        }
    }
    image
}

/// Evenly spread points on the unit sphere (Fibonacci lattice).
fn sphere_points(count: usize) -> Mesh {
    let golden = PI * (3.0 - 5.0_f32.sqrt());
    let vertices = (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let radius = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            [radius * theta.cos(), y, radius * theta.sin()]
        })
        .collect();
    Mesh { vertices }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn standard_manifest_is_valid() {
        let manifest = AssetManifest::standard();
        assert_eq!(manifest.len(), 6);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn saved_manifest_loads_back() {
        let path = std::env::temp_dir().join(format!("hyperview-manifest-{}.json", std::process::id()));
        AssetManifest::standard().save(&path).unwrap();
        let loaded = AssetManifest::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, AssetManifest::standard());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"{ "entries": [
            { "id": "a", "kind": "data", "path": "a.json" },
            { "id": "a", "kind": "video", "path": "a.mp4" }
        ] }"#;
        let err = AssetManifest::from_json_str(json).unwrap_err();
        assert!(format!("{err}").contains("`a`"));
    }

    #[test]
    fn typed_accessors_check_kind() {
        let mut store = AssetStore::new();
        store.insert("graphs", Asset::Data(serde_json::json!({ "nodes": 3 })));

        assert_eq!(store.data("graphs").unwrap()["nodes"], 3);
        assert!(matches!(
            store.video("graphs").unwrap_err(),
            HyperviewError::AssetKindMismatch { expected: "video", actual: "data", .. }
        ));
        assert!(matches!(
            store.mesh("missing").unwrap_err(),
            HyperviewError::UnknownAsset(id) if id == "missing"
        ));
    }

    #[test]
    fn procedural_assets_match_declared_kind() {
        let loader = ProceduralLoader::new(16, 8);
        for entry in AssetManifest::standard().entries {
            let asset = block_on(loader.load(&entry)).unwrap();
            assert_eq!(asset.kind(), entry.kind, "asset `{}`", entry.id);
        }
    }

    #[test]
    fn video_frames_loop() {
        let clip = VideoClip {
            frames: vec![
                Image::filled(1, 1, Rgb::BLACK),
                Image::filled(1, 1, Rgb::WHITE),
            ],
            frame_duration: Duration::from_millis(100),
        };
        assert_eq!(clip.frame_at(Duration::from_millis(150)), clip.frames.get(1));
        assert_eq!(clip.frame_at(Duration::from_millis(250)), clip.frames.first());
    }

    #[test]
    fn fs_loader_reports_missing_data_files() {
        let loader = FsLoader::new("/nonexistent-hyperview-root", ProceduralLoader::default());
        let entry = AssetEntry::new("graphs", AssetKind::Data, "graphs.json");
        assert!(matches!(block_on(loader.load(&entry)), Err(HyperviewError::Io(_))));

        let video = AssetEntry::new("clip", AssetKind::Video, "clip.mp4");
        assert_eq!(block_on(loader.load(&video)).unwrap().kind(), AssetKind::Video);
    }
}
