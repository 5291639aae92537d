//! Image based lighting: the prefiltered environment cubemap chain.

use crate::device::Texture;
use crate::scope::ScopeSpace;

/// Edge sizes of the prefiltered chain, sharpest first.
pub const PREFILTERED_SIZES: [u32; 6] = [128, 64, 32, 16, 8, 4];

/// Scene environment lighting.
///
/// The prefiltered chain is used only when all six cubemaps are present
/// with the expected sizes. Otherwise ambient light falls back to the
/// constant colour.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    prefiltered: Vec<Texture>,
    warned: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefiltered(mut self, cubemaps: Vec<Texture>) -> Self {
        self.set_prefiltered(cubemaps);
        self
    }

    pub fn set_prefiltered(&mut self, cubemaps: Vec<Texture>) {
        self.prefiltered = cubemaps;
        self.warned = false;
    }

    pub fn prefiltered(&self) -> &[Texture] {
        &self.prefiltered
    }

    /// Whether the chain has six cubemaps of sizes 128 down to 4.
    pub fn is_complete(&self) -> bool {
        self.prefiltered.len() == PREFILTERED_SIZES.len()
            && self
                .prefiltered
                .iter()
                .zip(PREFILTERED_SIZES)
                .all(|(texture, size)| texture.is_cubemap() && texture.width() == size)
    }

    /// The chain if it is usable. An incomplete chain is reported once.
    pub fn resolve(&mut self) -> Option<&[Texture]> {
        if self.is_complete() {
            return Some(&self.prefiltered);
        }
        if !self.prefiltered.is_empty() && !self.warned {
            self.warned = true;
            log::warn!(
                "Prefiltered environment has {} of {} usable cubemaps, using constant ambient",
                self.prefiltered
                    .iter()
                    .zip(PREFILTERED_SIZES)
                    .filter(|(texture, size)| texture.is_cubemap() && texture.width() == *size)
                    .count(),
                PREFILTERED_SIZES.len()
            );
        }
        None
    }

    /// Publish the complete chain as `texture_prefilteredCubeMap<size>`.
    pub fn bind(&self, scope: &ScopeSpace) {
        if !self.is_complete() {
            return;
        }
        for (texture, size) in self.prefiltered.iter().zip(PREFILTERED_SIZES) {
            scope
                .resolve(&format!("texture_prefilteredCubeMap{size}"))
                .set(texture.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{PixelFormat, TextureDescriptor};

    fn chain(sizes: &[u32]) -> Vec<Texture> {
        sizes
            .iter()
            .map(|size| Texture::new(TextureDescriptor::new_cube(*size, PixelFormat::Rgba8)))
            .collect()
    }

    #[test]
    fn test_complete_chain() {
        let mut environment = Environment::new().with_prefiltered(chain(&PREFILTERED_SIZES));
        assert!(environment.is_complete());
        assert_eq!(environment.resolve().map(<[Texture]>::len), Some(6));

        let scope = ScopeSpace::new("test");
        environment.bind(&scope);
        assert!(scope.find("texture_prefilteredCubeMap4").is_some());
    }

    #[test]
    fn test_incomplete_chain_is_unused() {
        let mut environment = Environment::new().with_prefiltered(chain(&[128, 64, 32, 16, 8]));
        assert!(environment.resolve().is_none());

        let mut wrong_size = Environment::new().with_prefiltered(chain(&[128, 64, 32, 16, 8, 8]));
        assert!(wrong_size.resolve().is_none());

        let scope = ScopeSpace::new("test");
        wrong_size.bind(&scope);
        assert!(scope.find("texture_prefilteredCubeMap128").is_none());
    }
}
