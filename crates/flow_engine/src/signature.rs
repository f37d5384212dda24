use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sync::lock_or_recover;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionStyle {
    pub style_id: String,
    #[serde(default)]
    pub use_fade: bool,
}

impl Default for TransitionStyle {
    fn default() -> Self {
        Self {
            style_id: "default".to_string(),
            use_fade: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SwapRequest {
    pub scenes_to_load: Option<Vec<String>>,
    pub scenes_to_unload: Option<Vec<String>>,
    pub target_active_scene: String,
    pub style: TransitionStyle,
    pub profile: String,
}

impl SwapRequest {
    pub fn new(
        scenes_to_load: Vec<String>,
        scenes_to_unload: Vec<String>,
        target_active_scene: impl Into<String>,
    ) -> Self {
        Self {
            scenes_to_load: Some(scenes_to_load),
            scenes_to_unload: Some(scenes_to_unload),
            target_active_scene: target_active_scene.into(),
            style: TransitionStyle::default(),
            profile: String::new(),
        }
    }

    pub fn with_style(mut self, style: TransitionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn has_scene_sets(&self) -> bool {
        self.scenes_to_load.is_some() && self.scenes_to_unload.is_some()
    }

    pub fn signature(&self) -> TransitionSignature {
        TransitionSignature::of(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TransitionSignature(String);

impl TransitionSignature {
    pub const UNKNOWN: TransitionSignature = TransitionSignature(String::new());

    pub fn of(request: &SwapRequest) -> Self {
        let mut hasher = Sha256::new();
        hash_scene_set(&mut hasher, "load", request.scenes_to_load.as_deref());
        hash_scene_set(&mut hasher, "unload", request.scenes_to_unload.as_deref());
        hash_field(&mut hasher, "active", &request.target_active_scene);
        hash_field(&mut hasher, "profile", &request.profile);
        hash_field(&mut hasher, "style", &request.style.style_id);
        Self(to_hex_lower(&hasher.finalize()))
    }

    pub fn from_raw(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for TransitionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            f.write_str(self.short())
        } else {
            f.write_str("<unknown>")
        }
    }
}

fn hash_scene_set(hasher: &mut Sha256, label: &str, scenes: Option<&[String]>) {
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    let Some(scenes) = scenes else {
        hasher.update([0xffu8]);
        return;
    };
    let mut sorted = scenes
        .iter()
        .map(|scene| scene.trim())
        .filter(|scene| !scene.is_empty())
        .collect::<Vec<_>>();
    sorted.sort_unstable();
    sorted.dedup();
    for scene in sorted {
        hasher.update(scene.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([1u8]);
}

fn hash_field(hasher: &mut Sha256, label: &str, value: &str) {
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    hasher.update(value.trim().as_bytes());
    hasher.update([0u8]);
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSwap {
    pub signature: TransitionSignature,
    pub target_active_scene: String,
    pub profile: String,
}

/// Remembers the most recently started environment swap so a commit observed
/// mid-swap can be tagged with the swap it belongs to.
#[derive(Debug, Default)]
pub struct SignatureCache {
    last_started: Mutex<Option<StartedSwap>>,
}

impl SignatureCache {
    pub fn record_started(&self, request: &SwapRequest) -> TransitionSignature {
        let signature = request.signature();
        let mut guard = lock_or_recover(&self.last_started, "signature_cache.record");
        *guard = Some(StartedSwap {
            signature: signature.clone(),
            target_active_scene: request.target_active_scene.clone(),
            profile: request.profile.clone(),
        });
        signature
    }

    pub fn last_started(&self) -> Option<StartedSwap> {
        lock_or_recover(&self.last_started, "signature_cache.read").clone()
    }

    pub fn current_signature(&self) -> TransitionSignature {
        self.last_started()
            .map(|started| started.signature)
            .unwrap_or(TransitionSignature::UNKNOWN)
    }

    pub fn clear_if(&self, signature: &TransitionSignature) -> bool {
        let mut guard = lock_or_recover(&self.last_started, "signature_cache.clear");
        match guard.as_ref() {
            Some(started) if started.signature == *signature => {
                *guard = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(load: &[&str], unload: &[&str], active: &str) -> SwapRequest {
        SwapRequest::new(
            load.iter().map(ToString::to_string).collect(),
            unload.iter().map(ToString::to_string).collect(),
            active,
        )
    }

    #[test]
    fn identical_content_yields_identical_signature() {
        let a = request(&["Gameplay", "HUD"], &["Menu"], "Gameplay");
        let b = request(&["Gameplay", "HUD"], &["Menu"], "Gameplay");
        assert_eq!(a.signature(), b.signature());
        assert!(a.signature().is_known());
    }

    #[test]
    fn signature_ignores_scene_order() {
        let a = request(&["HUD", "Gameplay"], &["Menu", "Boot"], "Gameplay");
        let b = request(&["Gameplay", "HUD"], &["Boot", "Menu"], "Gameplay");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_changes_with_profile_style_or_target() {
        let base = request(&["Gameplay"], &["Menu"], "Gameplay");
        let other_target = request(&["Gameplay"], &["Menu"], "HUD");
        let other_profile = base.clone().with_profile("startup");
        let other_style = base.clone().with_style(TransitionStyle {
            style_id: "cut".to_string(),
            use_fade: false,
        });

        assert_ne!(base.signature(), other_target.signature());
        assert_ne!(base.signature(), other_profile.signature());
        assert_ne!(base.signature(), other_style.signature());
    }

    #[test]
    fn load_and_unload_sets_are_not_interchangeable() {
        let a = request(&["Gameplay"], &["Menu"], "Gameplay");
        let b = request(&["Menu"], &["Gameplay"], "Gameplay");
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn cache_reports_unknown_until_a_swap_starts() {
        let cache = SignatureCache::default();
        assert_eq!(cache.current_signature(), TransitionSignature::UNKNOWN);

        let started = request(&["Gameplay"], &["Menu"], "Gameplay");
        let signature = cache.record_started(&started);
        assert_eq!(cache.current_signature(), signature);

        assert!(!cache.clear_if(&TransitionSignature::from_raw("other")));
        assert!(cache.clear_if(&signature));
        assert_eq!(cache.current_signature(), TransitionSignature::UNKNOWN);
    }
}
