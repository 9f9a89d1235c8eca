use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use simple_logger::SimpleLogger;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use chip8_interp::{
    emu::{DEFAULT_CYCLE_HZ, DISPLAY_X, DISPLAY_Y, Framebuffer, Machine, Runner, load_rom},
    u4,
};

const LIT: [u8; 4] = [0x33, 0xff, 0x66, 0xff];
const UNLIT: [u8; 4] = [0x10, 0x10, 0x10, 0xff];
const TONE_HZ: f32 = 440.0;

/// Maps a host key to its CHIP-8 keypad position.
///
/// The 4x4 block at 1-4 / Q-R / A-F / Z-V mirrors the COSMAC VIP keypad.
fn keypad_key(code: KeyCode) -> Option<u4> {
    let key = match code {
        KeyCode::KeyX => 0x0,
        KeyCode::Digit1 => 0x1,
        KeyCode::Digit2 => 0x2,
        KeyCode::Digit3 => 0x3,
        KeyCode::KeyQ => 0x4,
        KeyCode::KeyW => 0x5,
        KeyCode::KeyE => 0x6,
        KeyCode::KeyA => 0x7,
        KeyCode::KeyS => 0x8,
        KeyCode::KeyD => 0x9,
        KeyCode::KeyZ => 0xA,
        KeyCode::KeyC => 0xB,
        KeyCode::Digit4 => 0xC,
        KeyCode::KeyR => 0xD,
        KeyCode::KeyF => 0xE,
        KeyCode::KeyV => 0xF,
        _ => return None,
    };
    Some(u4::new(key))
}

/// Square wave gated by the sound timer.
struct Beeper {
    // Dropping the stream silences the sink
    _stream: OutputStream,
    sink: Sink,
}

impl Beeper {
    fn open() -> anyhow::Result<Self> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        sink.append(SquareWave::new(TONE_HZ).amplify(0.25));

        Ok(Self { _stream: stream, sink })
    }

    fn set_active(&self, active: bool) {
        match (active, self.sink.is_paused()) {
            (true, true) => self.sink.play(),
            (false, false) => self.sink.pause(),
            _ => {}
        }
    }
}

/// Window plus the pixel surface drawn into it.
struct Screen {
    window: Arc<Window>,
    pixels: Pixels<'static>,
}

impl Screen {
    fn create(event_loop: &ActiveEventLoop, scale: u32) -> anyhow::Result<Self> {
        let (width, height) = (DISPLAY_X as u32, DISPLAY_Y as u32);

        let attributes = Window::default_attributes()
            .with_title("chip8-interp")
            .with_inner_size(LogicalSize::new(width * scale, height * scale))
            .with_min_inner_size(LogicalSize::new(width, height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        let pixels =
            Pixels::new(width, height, surface).context("Failed to create pixels surface")?;

        Ok(Self { window, pixels })
    }

    fn blit(&mut self, frame: &Framebuffer) {
        let rgba = self.pixels.frame_mut().chunks_exact_mut(4);
        for (px, &on) in rgba.zip(frame.cells()) {
            px.copy_from_slice(if on { &LIT } else { &UNLIT });
        }
    }
}

struct App {
    runner: Runner,
    beeper: Beeper,
    scale: u32,
    screen: Option<Screen>,
    last_frame: Instant,
    /// First error raised inside the event loop, returned from `main`.
    outcome: anyhow::Result<()>,
}

impl App {
    fn new(runner: Runner, scale: u32) -> anyhow::Result<Self> {
        Ok(Self {
            runner,
            beeper: Beeper::open()?,
            scale: scale.max(1),
            screen: None,
            last_frame: Instant::now(),
            outcome: Ok(()),
        })
    }

    fn screen(&mut self) -> anyhow::Result<&mut Screen> {
        self.screen.as_mut().context("Window not created yet")
    }

    fn open_screen(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let mut screen = Screen::create(event_loop, self.scale)?;
        screen.blit(self.runner.machine().display());
        screen.window.request_redraw();

        self.screen = Some(screen);
        self.last_frame = Instant::now();
        Ok(())
    }

    /// Advances the machine by the wall time since the previous frame and presents it.
    fn frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.runner.update(dt).context("CHIP-8 execution halted")?;
        self.beeper.set_active(self.runner.should_beep());

        let screen = self.screen.as_mut().context("Window not created yet")?;
        if let Some(frame) = self.runner.machine_mut().take_frame() {
            screen.blit(frame);
        }
        screen.pixels.render().context("Failed to render frame")?;
        screen.window.request_redraw();

        Ok(())
    }

    fn handle_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape {
                    event_loop.exit();
                } else if let Some(key) = keypad_key(code) {
                    self.runner.set_key(key, state == ElementState::Pressed);
                }
            }

            WindowEvent::Resized(size) => {
                self.screen()?
                    .pixels
                    .resize_surface(size.width, size.height)
                    .context("Failed to resize pixels surface")?;
            }

            WindowEvent::RedrawRequested => self.frame()?,

            _ => {}
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.outcome = Err(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.screen.is_none()
            && let Err(e) = self.open_screen(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.handle_event(event_loop, event) {
            self.fail(event_loop, e);
        }
    }
}

/// CHIP-8 interpreter.
///
/// Keys 1-4, Q-R, A-F, Z-V map to the CHIP-8 keypad. Escape quits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Instructions executed per second (timers tick once per instruction)
    #[arg(long, default_value_t = DEFAULT_CYCLE_HZ)]
    hz: f32,

    /// Seed for the random number instruction
    #[arg(long)]
    seed: Option<u64>,

    /// Window size multiplier
    #[arg(long, default_value_t = 10)]
    scale: u32,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    SimpleLogger::new()
        .with_level(args.log)
        .init()
        .context("Failed to initialize logger")?;

    let rom = load_rom(&args.rom_path).context("Failed to read ROM file")?;

    let mut machine = args.seed.map_or_else(Machine::new, Machine::with_seed);
    machine
        .load_program(&rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(Runner::new(machine, args.hz), args.scale)
        .context("Failed to initialize application")?;
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    app.outcome
}
