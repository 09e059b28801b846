use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque handle to a texture owned by the texture registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

/// Texture loading and derived-texture generation.
///
/// Called from the thread that owns the scene; implementations may talk to
/// the GPU.
pub trait TextureRegistry {
    /// Load (or reuse) the texture at `path`. Loading the same path twice
    /// must return the same handle.
    fn load(&mut self, path: &str) -> TextureHandle;

    /// Create a surface mask texture derived from `source`.
    fn create_mask_texture(&mut self, source: TextureHandle) -> TextureHandle;

    /// Create a normal map derived from `source`'s luminance.
    fn create_normal_map_texture(&mut self, source: TextureHandle, strength: f32)
    -> TextureHandle;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextureEntry {
    File { path: String },
    Mask { source: TextureHandle },
    NormalMap { source: TextureHandle, strength: f32 },
}

/// Content-addressed, in-memory texture registry.
///
/// Handles are derived from a SHA-256 of the request, so the same path or
/// derivation always yields the same handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextureRegistry {
    textures: BTreeMap<TextureHandle, TextureEntry>,
    requests: usize,
}

impl MemoryTextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureEntry> {
        self.textures.get(&handle)
    }

    /// Number of distinct textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Total calls made against the registry, including repeats.
    pub fn request_count(&self) -> usize {
        self.requests
    }

    fn register(&mut self, entry: TextureEntry) -> TextureHandle {
        self.requests += 1;
        let handle = content_hash(&entry);
        self.textures.entry(handle).or_insert(entry);
        handle
    }
}

impl TextureRegistry for MemoryTextureRegistry {
    fn load(&mut self, path: &str) -> TextureHandle {
        self.register(TextureEntry::File {
            path: path.to_ascii_lowercase(),
        })
    }

    fn create_mask_texture(&mut self, source: TextureHandle) -> TextureHandle {
        self.register(TextureEntry::Mask { source })
    }

    fn create_normal_map_texture(
        &mut self,
        source: TextureHandle,
        strength: f32,
    ) -> TextureHandle {
        self.register(TextureEntry::NormalMap { source, strength })
    }
}

fn content_hash(entry: &TextureEntry) -> TextureHandle {
    let mut hasher = Sha256::new();
    match entry {
        TextureEntry::File { path } => {
            hasher.update(b"file");
            hasher.update(path.as_bytes());
        }
        TextureEntry::Mask { source } => {
            hasher.update(b"mask");
            hasher.update(source.0.to_le_bytes());
        }
        TextureEntry::NormalMap { source, strength } => {
            hasher.update(b"normal");
            hasher.update(source.0.to_le_bytes());
            hasher.update(strength.to_le_bytes());
        }
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&result[..8]);
    TextureHandle(u64::from_le_bytes(bytes))
}
