//! main.rs - Desktop simulator for the rain animation
//! Stands in for the LED panel: window, wall clock and entropy

use core::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use embedded_graphics::{pixelcolor::Rgb888, prelude::*};
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rain_rust::{Canvas, Clock, Palette, ParticleField, Settings, XorShift32};

// Real sleeps, xorshift randomness
struct StdClock {
    rng: XorShift32,
}

impl Clock for StdClock {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    fn random_int(&mut self, min: i32, max: i32) -> i32 {
        self.rng.random_int(min, max)
    }
}

fn wall_clock_seed(fallback: u32) -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.subsec_nanos() ^ since.as_secs() as u32)
        .unwrap_or(fallback)
}

fn quit_requested(event: &SimulatorEvent) -> bool {
    match event {
        SimulatorEvent::Quit => true,
        SimulatorEvent::KeyDown { keycode, .. } => {
            let key = format!("{:?}", keycode).to_lowercase();
            matches!(key.as_str(), "q" | "escape")
        }
        _ => false,
    }
}

fn main() -> Result<(), Infallible> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = Settings::default();

    let display: SimulatorDisplay<Rgb888> =
        SimulatorDisplay::new(Size::new(settings.screen_width, settings.screen_height));
    // Spaced pixels read like an LED matrix
    let output_settings = OutputSettingsBuilder::new()
        .scale(settings.scale)
        .pixel_spacing(1)
        .build();
    let mut window = Window::new("Rain - Simulated Raindrops", &output_settings);

    // Set from the window on close or Q / Escape
    let stop = AtomicBool::new(false);

    let mut canvas = Canvas::new(display, |display: &mut SimulatorDisplay<Rgb888>| {
        window.update(display);
        for event in window.events() {
            if quit_requested(&event) {
                stop.store(true, Ordering::Relaxed);
            }
        }
        Ok::<(), Infallible>(())
    });

    let seed = wall_clock_seed(settings.rng_seed);
    let mut clock = StdClock {
        rng: XorShift32::new(seed),
    };
    let mut field = ParticleField::for_display(&Palette::RAIN, &canvas, settings);

    println!("=== Rain - Simulated Raindrops ===");
    println!("Panel: {}x{}", field.bounds().width, field.bounds().height);
    println!("Controls:");
    println!("  Q / Escape: Quit");
    info!(seed, "starting rain loop");

    let frames = field.run(&mut canvas, &mut clock, &stop)?;

    info!(frames, "rain loop finished");
    println!("Thanks for watching the rain!");
    Ok(())
}
