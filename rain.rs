//! rain - Raindrop ripples for small LED matrix panels
//! No heap allocation, no_std compatible

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    draw_target::DrawTargetExt,
    primitives::{Circle, PrimitiveStyle},
};
use heapless::Vec;
#[cfg(feature = "tracing")]
use tracing::{debug, trace, warn};

// Drop lifecycle: born at 1, retired at 7, core dot back after 4
pub const SPAWN_AGE: u32 = 1;
pub const EXPIRY_AGE: u32 = 7;
pub const CORE_DOT_AGE: u32 = 4;
pub const CORE_DOT_RADIUS: u32 = 1;

// Pool size. Default thresholds never get past 10
pub const MAX_DROPS: usize = 16;

pub const PALETTE_LEN: usize = 7;

// Fixed configuration, same shape as the particle simulator settings
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    // Panel bounds (Galactic Unicorn by default)
    pub screen_width: u32,
    pub screen_height: u32,

    // Population threshold, drawn fresh every frame (inclusive)
    pub min_population: i32,
    pub max_population: i32,

    // Timing
    pub frame_interval: Duration,

    // RNG seed
    pub rng_seed: u32,

    // Simulator pixel scale
    pub scale: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_width: 53,
            screen_height: 11,
            min_population: 4,
            max_population: 10,
            frame_interval: Duration::from_millis(150),
            rng_seed: 0x1234_5678,
            scale: 8,
        }
    }
}

/// Colour ramp indexed by drop age, white fading through blues to near black.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Palette([Rgb888; PALETTE_LEN]);

impl Palette {
    pub const RAIN: Palette = Palette([
        Rgb888::new(255, 255, 255),
        Rgb888::new(50, 50, 150),
        Rgb888::new(40, 40, 100),
        Rgb888::new(30, 30, 80),
        Rgb888::new(20, 20, 50),
        Rgb888::new(10, 10, 20),
        Rgb888::new(5, 5, 10),
    ]);

    // Clears the panel and hollows out rings
    pub const BACKGROUND: Rgb888 = Rgb888::BLACK;

    // Saturates at the darkest entry
    pub fn pen(&self, index: usize) -> Rgb888 {
        self.0[index.min(PALETTE_LEN - 1)]
    }

    pub fn pens(&self) -> &[Rgb888] {
        &self.0
    }
}

/// Drawing surface the field renders onto. Pens are sticky.
pub trait Display {
    type Error;

    fn size(&self) -> Size;
    fn clear(&mut self) -> Result<(), Self::Error>;
    fn set_pen(&mut self, pen: Rgb888);
    fn fill_circle(&mut self, center: Point, radius: u32) -> Result<(), Self::Error>;
    // Push the finished frame out to the physical panel
    fn present(&mut self) -> Result<(), Self::Error>;
}

// Frame pacing and randomness
pub trait Clock {
    fn sleep(&mut self, duration: Duration);

    // Inclusive upper bound
    fn random_int(&mut self, min: i32, max: i32) -> i32;
}

// Simple PRNG (xorshift32)
#[derive(Clone, Debug)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    // xorshift never leaves zero, so a zero seed gets swapped for this one
    const FALLBACK_SEED: u32 = 0x1234_5678;

    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { Self::FALLBACK_SEED } else { seed },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        self.state
    }

    // Integer in min..=max, or min for an empty range
    pub fn random_int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (i64::from(max) - i64::from(min) + 1) as u64;
        let offset = u64::from(self.next_u32()) % span;
        (i64::from(min) + offset as i64) as i32
    }
}

/// Adapts any embedded-graphics draw target into a [`Display`].
/// `present` hands the target to the flush closure (panel driver or simulator window).
pub struct Canvas<D, F> {
    target: D,
    present: F,
    pen: Rgb888,
}

impl<D, F> Canvas<D, F> {
    pub fn new(target: D, present: F) -> Self {
        Self {
            target,
            present,
            pen: Palette::BACKGROUND,
        }
    }

    pub fn into_inner(self) -> D {
        self.target
    }
}

impl<D, F> Display for Canvas<D, F>
where
    D: DrawTarget,
    D::Color: From<Rgb888>,
    F: FnMut(&mut D) -> Result<(), D::Error>,
{
    type Error = D::Error;

    fn size(&self) -> Size {
        self.target.bounding_box().size
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.target.clear(Palette::BACKGROUND.into())
    }

    fn set_pen(&mut self, pen: Rgb888) {
        self.pen = pen;
    }

    fn fill_circle(&mut self, center: Point, radius: u32) -> Result<(), Self::Error> {
        let color: D::Color = self.pen.into();
        let area = self.target.bounding_box();
        // embedded-graphics circles are sized by diameter, centre pixel included
        Circle::with_center(center, 2 * radius + 1)
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(&mut self.target.clipped(&area))
    }

    fn present(&mut self) -> Result<(), Self::Error> {
        (self.present)(&mut self.target)
    }
}

/// One drop: a disc that grows into a fading ring and then disappears.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Raindrop {
    x: i32,
    y: i32,
    age: u32,
}

impl Raindrop {
    pub const fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            age: SPAWN_AGE,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    /// Disc of radius `age` in the ramp colour, hollowed to a one pixel
    /// ring once `age > 1`, with a small core dot restored once `age > 4`.
    pub fn draw<D>(&self, display: &mut D, palette: &Palette) -> Result<(), D::Error>
    where
        D: Display + ?Sized,
    {
        let center = self.position();
        let pen = palette.pen(self.age as usize);

        display.set_pen(pen);
        display.fill_circle(center, self.age)?;

        if self.age > 1 {
            display.set_pen(Palette::BACKGROUND);
            display.fill_circle(center, self.age - 1)?;
        }

        if self.age > CORE_DOT_AGE {
            display.set_pen(pen);
            display.fill_circle(center, CORE_DOT_RADIUS)?;
        }

        Ok(())
    }

    pub fn update(&mut self) {
        self.age = self.age.saturating_add(1);
    }

    pub fn is_alive(&self) -> bool {
        self.age < EXPIRY_AGE
    }
}

// Summary of one frame
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub pruned: usize,
    pub spawned: bool,
    pub drawn: usize,
}

/// Owns the live drops and runs the clear, prune, spawn, render, present,
/// pace cycle against the display.
pub struct ParticleField<'p> {
    palette: &'p Palette,
    // Insertion order is draw order
    drops: Vec<Raindrop, MAX_DROPS>,
    bounds: Size,
    settings: Settings,
}

impl<'p> ParticleField<'p> {
    // Spawn positions cover 0..=width by 0..=height
    pub fn new(palette: &'p Palette, bounds: Size, settings: Settings) -> Self {
        Self {
            palette,
            drops: Vec::new(),
            bounds,
            settings,
        }
    }

    // Size queried once, here
    pub fn for_display<D>(palette: &'p Palette, display: &D, settings: Settings) -> Self
    where
        D: Display + ?Sized,
    {
        Self::new(palette, display.size(), settings)
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    // Draw order
    pub fn drops(&self) -> &[Raindrop] {
        &self.drops
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    // Stable filter, keeps draw order intact
    fn prune(&mut self) -> usize {
        let before = self.drops.len();
        self.drops.retain(Raindrop::is_alive);
        before - self.drops.len()
    }

    // At most one new drop per frame, however far below the threshold we are
    fn maintain<C>(&mut self, clock: &mut C) -> bool
    where
        C: Clock + ?Sized,
    {
        let threshold = clock.random_int(self.settings.min_population, self.settings.max_population);
        if self.drops.len() as i64 >= i64::from(threshold) {
            return false;
        }

        if self.drops.is_full() {
            #[cfg(feature = "tracing")]
            warn!(capacity = MAX_DROPS, threshold, "raindrop pool full, skipping spawn");
            return false;
        }

        // COMPAT: both axes include the far edge
        let x = clock.random_int(0, self.bounds.width as i32);
        let y = clock.random_int(0, self.bounds.height as i32);

        // Capacity checked above
        let _ = self.drops.push(Raindrop::new(x, y));
        #[cfg(feature = "tracing")]
        trace!(x, y, threshold, population = self.drops.len(), "raindrop spawned");
        true
    }

    /// Advance one frame. Display failures abort the frame and are returned unchanged.
    pub fn advance_frame<D, C>(&mut self, display: &mut D, clock: &mut C) -> Result<FrameStats, D::Error>
    where
        D: Display + ?Sized,
        C: Clock + ?Sized,
    {
        display.clear()?;

        let pruned = self.prune();
        let spawned = self.maintain(clock);

        // Draw at the current age, then age
        for drop in self.drops.iter_mut() {
            drop.draw(display, self.palette)?;
            drop.update();
        }
        let drawn = self.drops.len();

        display.present()?;
        clock.sleep(self.settings.frame_interval);

        #[cfg(feature = "tracing")]
        trace!(pruned, spawned, drawn, "frame advanced");
        Ok(FrameStats {
            pruned,
            spawned,
            drawn,
        })
    }

    // Returns the number of frames advanced
    pub fn run<D, C>(&mut self, display: &mut D, clock: &mut C, stop: &AtomicBool) -> Result<u64, D::Error>
    where
        D: Display + ?Sized,
        C: Clock + ?Sized,
    {
        let mut frames = 0u64;
        while !stop.load(Ordering::Relaxed) {
            self.advance_frame(display, clock)?;
            frames += 1;
        }
        #[cfg(feature = "tracing")]
        debug!(frames, "rain loop stopped");
        Ok(frames)
    }
}
