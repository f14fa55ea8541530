//! # Layer Compositor
//!
//! Holds up to [`MAX_LAYERS`] registered layers and composes them into a
//! back buffer each frame, painter's-algorithm style: registration order
//! is stacking order, later layers draw on top.
//!
//! ## Frame pipeline
//!
//! ```text
//! static layers --(only when dirty)--> static plane
//!                                          |
//!                                          v  copy
//! dynamic layers ---(every frame)---> back buffer --> cursor --> device
//! ```
//!
//! Layers marked dynamic are recomposited every frame. Everything else is
//! cached in the static plane, which is rebuilt only when the dirty signal
//! fires: registering a static layer, touching one through
//! [`Compositor::layer_mut`], or an explicit
//! [`Compositor::mark_static_dirty`] after an out-of-band buffer write.
//! With no dirt and no dynamic changes, repeated refreshes produce
//! byte-identical frames.

pub mod font;
pub mod layer;

pub use layer::Layer;

use alloc::boxed::Box;
use alloc::vec;

use crate::devices::mouse_cursor;
use crate::framebuffer::FramebufferTarget;

/// Hard ceiling on registered layers; registrations beyond it are
/// silently dropped.
pub const MAX_LAYERS: usize = 8;

/// Opaque black; the static plane is cleared to this so inactive layers
/// leave no ghosts.
pub const BASE_COLOR: u32 = 0xFF00_0000;

/// Ticket returned by [`Compositor::register`]. Layers are never
/// unregistered, so a handle stays valid for the compositor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerHandle(usize);

pub struct Compositor<'a> {
    width: usize,
    height: usize,
    back: Box<[u32]>,
    static_plane: Box<[u32]>,
    layers: [Option<Layer<'a>>; MAX_LAYERS],
    layer_count: usize,
    static_dirty: bool,
    target: Option<FramebufferTarget<'a>>,
}

impl<'a> Compositor<'a> {
    /// Composition geometry comes from the boot-provided framebuffer info;
    /// the device itself is bound later via [`Self::set_target`].
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            back: vec![BASE_COLOR; width * height].into_boxed_slice(),
            static_plane: vec![BASE_COLOR; width * height].into_boxed_slice(),
            layers: [None, None, None, None, None, None, None, None],
            layer_count: 0,
            static_dirty: true,
            target: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Append a layer to the stack. Returns `None` once all slots are
    /// taken; the layer is dropped, matching the registry's silent-drop
    /// contract.
    pub fn register(&mut self, layer: Layer<'a>) -> Option<LayerHandle> {
        if self.layer_count == MAX_LAYERS {
            return None;
        }
        if !layer.is_dynamic() {
            self.static_dirty = true;
        }
        let handle = LayerHandle(self.layer_count);
        self.layers[self.layer_count] = Some(layer);
        self.layer_count += 1;
        Some(handle)
    }

    pub fn layer(&self, handle: LayerHandle) -> Option<&Layer<'a>> {
        self.layers[handle.0].as_ref()
    }

    /// Mutable access to a registered layer. Touching a static layer
    /// invalidates the cached plane; the dirty signal rides the mutation
    /// path instead of living in a free-floating global.
    pub fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut Layer<'a>> {
        if let Some(layer) = self.layers[handle.0].as_ref() {
            if !layer.is_dynamic() {
                self.static_dirty = true;
            }
        }
        self.layers[handle.0].as_mut()
    }

    /// Force a static-plane rebuild on the next refresh. Needed only when
    /// a static layer's pixel buffer was written behind the compositor's
    /// back.
    pub fn mark_static_dirty(&mut self) {
        self.static_dirty = true;
    }

    /// Late-bind the device scanout.
    pub fn set_target(&mut self, target: FramebufferTarget<'a>) {
        self.target = Some(target);
    }

    /// The last composed frame.
    pub fn back(&self) -> &[u32] {
        &self.back
    }

    /// Compose one frame and flip it to the device (if bound). `cursor`
    /// is drawn last, over everything.
    pub fn refresh(&mut self, cursor: Option<(i32, i32)>) {
        if self.static_dirty {
            self.static_plane.fill(BASE_COLOR);
            for layer in self.layers.iter().flatten() {
                if layer.is_active() && !layer.is_dynamic() {
                    Self::composite_layer(&mut self.static_plane, self.width, self.height, layer);
                }
            }
            self.static_dirty = false;
        }

        self.back.copy_from_slice(&self.static_plane);

        for layer in self.layers.iter().flatten() {
            if layer.is_active() && layer.is_dynamic() {
                Self::composite_layer(&mut self.back, self.width, self.height, layer);
            }
        }

        if let Some((x, y)) = cursor {
            mouse_cursor::draw(&mut self.back, self.width, self.height, x, y);
        }

        if let Some(target) = self.target.as_mut() {
            target.present(&self.back);
        }
    }

    /// Per-pixel copy with clipping and keyed transparency. Out-of-bounds
    /// pixels are skipped, never wrapped.
    fn composite_layer(dest: &mut [u32], width: usize, height: usize, layer: &Layer<'_>) {
        let pixels = layer.pixels();
        for ly in 0..layer.height() {
            let sy = layer.y() + ly as i32;
            if sy < 0 || sy >= height as i32 {
                continue;
            }
            for lx in 0..layer.width() {
                let sx = layer.x() + lx as i32;
                if sx < 0 || sx >= width as i32 {
                    continue;
                }
                let color = pixels[ly * layer.width() + lx];
                if layer.transparent_key() == Some(color) {
                    continue;
                }
                dest[sy as usize * width + sx as usize] = color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(buf: &mut [u32], color: u32) -> &mut [u32] {
        buf.fill(color);
        buf
    }

    #[test]
    fn partially_offscreen_layers_clip_instead_of_wrapping() {
        let mut buf = [0xFFAA_AAAAu32; 4 * 4];
        let mut compositor = Compositor::new(8, 8);
        compositor.register(Layer::new(&mut buf, 4, 4).at(6, -2));

        compositor.refresh(None);

        let back = compositor.back();
        // In-bounds corner of the layer landed.
        assert_eq!(back[0 * 8 + 6], 0xFFAA_AAAA);
        assert_eq!(back[1 * 8 + 7], 0xFFAA_AAAA);
        // Nothing wrapped onto the left edge or other rows.
        for y in 0..8 {
            for x in 0..6 {
                assert_eq!(back[y * 8 + x], BASE_COLOR, "({}, {}) touched", x, y);
            }
        }
    }

    #[test]
    fn later_registration_paints_over_earlier() {
        let mut below = [0u32; 4 * 4];
        let mut above = [0u32; 4 * 4];
        let mut compositor = Compositor::new(8, 8);
        compositor.register(Layer::new(solid(&mut below, 0xFF11_1111), 4, 4).at(0, 0));
        compositor.register(Layer::new(solid(&mut above, 0xFF22_2222), 4, 4).at(2, 2));

        compositor.refresh(None);

        let back = compositor.back();
        assert_eq!(back[0], 0xFF11_1111); // only the lower layer
        assert_eq!(back[3 * 8 + 3], 0xFF22_2222); // overlap: upper wins
        assert_eq!(back[5 * 8 + 5], 0xFF22_2222); // only the upper layer
    }

    #[test]
    fn keyed_pixels_let_the_layer_below_show_through() {
        let mut below = [0u32; 4 * 4];
        let mut above = [0u32; 4 * 4];
        solid(&mut above, 0xFF22_2222);
        above[0] = 0x0000_0000; // the keyed value

        let mut compositor = Compositor::new(8, 8);
        compositor.register(Layer::new(solid(&mut below, 0xFF11_1111), 4, 4).at(0, 0));
        compositor.register(Layer::new(&mut above, 4, 4).at(0, 0).with_transparent_key(0));

        compositor.refresh(None);

        let back = compositor.back();
        assert_eq!(back[0], 0xFF11_1111); // keyed pixel skipped
        assert_eq!(back[1], 0xFF22_2222); // everything else copied
    }

    #[test]
    fn zero_is_a_usable_key_only_when_declared() {
        let mut undeclared = [0x0000_0000u32; 4];
        let mut compositor = Compositor::new(4, 4);
        compositor.register(Layer::new(&mut undeclared, 2, 2).at(0, 0));

        compositor.refresh(None);
        // No key declared: the all-zero (transparent-black) pixels are
        // copied as-is, they do not vanish.
        assert_eq!(compositor.back()[0], 0x0000_0000);
    }

    #[test]
    fn inactive_layers_leave_no_ghost_after_deactivation() {
        let mut buf = [0xFF33_3333u32; 4];
        let mut compositor = Compositor::new(4, 4);
        let handle = compositor.register(Layer::new(&mut buf, 2, 2)).unwrap();

        compositor.refresh(None);
        assert_eq!(compositor.back()[0], 0xFF33_3333);

        compositor.layer_mut(handle).unwrap().set_active(false);
        compositor.refresh(None);
        assert_eq!(compositor.back()[0], BASE_COLOR);
    }

    #[test]
    fn refresh_is_idempotent_without_dirt() {
        let mut bg = [0xFF44_4444u32; 8 * 8];
        let mut sprite = [0xFF55_5555u32; 4];
        let mut compositor = Compositor::new(8, 8);
        compositor.register(Layer::new(&mut bg, 8, 8));
        compositor.register(Layer::new(&mut sprite, 2, 2).at(3, 3).animated());

        compositor.refresh(Some((1, 1)));
        let first: alloc::vec::Vec<u32> = compositor.back().to_vec();

        for _ in 0..3 {
            compositor.refresh(Some((1, 1)));
        }
        assert_eq!(compositor.back(), &first[..]);
    }

    #[test]
    fn touching_a_static_layer_invalidates_the_cached_plane() {
        let mut bg = [0xFF66_6666u32; 4 * 4];
        let mut compositor = Compositor::new(4, 4);
        let handle = compositor.register(Layer::new(&mut bg, 4, 4)).unwrap();

        compositor.refresh(None);
        compositor.layer_mut(handle).unwrap().set_pixel(0, 0, 0xFF77_7777);
        compositor.refresh(None);

        assert_eq!(compositor.back()[0], 0xFF77_7777);
    }

    #[test]
    fn moving_a_dynamic_layer_needs_no_dirty_signal() {
        let mut bg = [0xFF10_1010u32; 8 * 8];
        let mut sprite = [0xFF99_9999u32; 4];
        let mut compositor = Compositor::new(8, 8);
        compositor.register(Layer::new(&mut bg, 8, 8));
        let sprite = compositor
            .register(Layer::new(&mut sprite, 2, 2).at(0, 0).animated())
            .unwrap();

        compositor.refresh(None);
        assert_eq!(compositor.back()[0], 0xFF99_9999);

        compositor.layer_mut(sprite).unwrap().move_to(4, 0);
        compositor.refresh(None);

        let back = compositor.back();
        assert_eq!(back[0], 0xFF10_1010); // old spot restored from the plane
        assert_eq!(back[4], 0xFF99_9999); // new spot painted
    }

    #[test]
    fn registrations_beyond_the_ceiling_are_dropped() {
        let mut bufs = [[0xFF12_3456u32; 4]; MAX_LAYERS + 1];
        let mut compositor = Compositor::new(4, 4);

        let mut handles = alloc::vec::Vec::new();
        for buf in bufs.iter_mut() {
            handles.push(compositor.register(Layer::new(buf, 2, 2)));
        }

        assert!(handles[..MAX_LAYERS].iter().all(Option::is_some));
        assert_eq!(handles[MAX_LAYERS], None);
    }

    #[test]
    fn cursor_overlays_every_layer() {
        let mut bg = [0xFF00_5500u32; 16 * 19];
        let mut compositor = Compositor::new(16, 19);
        compositor.register(Layer::new(&mut bg, 16, 19));

        compositor.refresh(Some((0, 0)));
        // The arrow's hotspot is outline-black, over the green layer.
        assert_eq!(compositor.back()[0], 0xFF00_0000);
    }
}
