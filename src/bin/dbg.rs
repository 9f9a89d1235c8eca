use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::LevelFilter;
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};
use simple_logger::SimpleLogger;

use chip8_interp::{
    debugger::{Cli, Command, CommandResult, Executor},
    emu::{
        DEFAULT_CYCLE_HZ, DISPLAY_X, DISPLAY_Y, Machine, Opcode, Runner, RunnerResult, load_rom,
    },
    u4,
};

/// Host keys for CHIP-8 keys 0x0-0xF.
const KEY_MAP: [char; 16] = [
    'x', '1', '2', '3', 'q', 'w', 'e', 'a', 's', 'd', 'z', 'c', '4', 'r', 'f', 'v',
];

/// Keypad as drawn on the original hardware.
const KEYPAD_LAYOUT: [[u8; 4]; 4] = [
    [0x1, 0x2, 0x3, 0xC],
    [0x4, 0x5, 0x6, 0xD],
    [0x7, 0x8, 0x9, 0xE],
    [0xA, 0x0, 0xB, 0xF],
];

// Terminals on Linux never report key releases, so a press counts as held
// until this long has passed without a repeat.
const KEY_HOLD: Duration = Duration::from_millis(50);

const SIDE_WIDTH: u16 = 24;
const CODE_LINES: u16 = 9;

struct App {
    executor: Executor,
    input: String,
    output: String,
    should_quit: bool,
    last_tick: Instant,
    last_command: Option<Command>,
    key_release_at: [Option<Instant>; 16],
}

impl App {
    fn new(rom: Vec<u8>, args: &Args) -> anyhow::Result<Self> {
        let mut machine = args.seed.map_or_else(Machine::new, Machine::with_seed);
        machine
            .load_program(&rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        Ok(Self {
            executor: Executor::new(Runner::new(machine, args.hz), rom),
            input: String::new(),
            output: String::from("Type `help` for a list of commands"),
            should_quit: false,
            last_tick: Instant::now(),
            last_command: None,
            key_release_at: [None; 16],
        })
    }

    fn machine(&self) -> &Machine {
        self.executor.runner().machine()
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            self.tick();
            terminal.draw(|frame| self.draw(frame))?;
            self.release_expired_keys();

            if event::poll(Duration::from_millis(16))?
                && let Event::Key(key) = event::read()?
            {
                self.handle_key_event(key);
            }
        }

        Ok(())
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_tick).as_secs_f32();
        self.last_tick = now;

        match self.executor.poll(dt) {
            Ok(RunnerResult::Ok) => {}
            Ok(RunnerResult::HitBreakpoint) => {
                self.output = format!("Hit breakpoint at {:03X}", self.machine().pc());
            }
            Err(e) => {
                self.output = format!("Halted: {e}");
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn release_expired_keys(&mut self) {
        let now = Instant::now();

        for (key, release_at) in self.key_release_at.iter_mut().enumerate() {
            if let Some(deadline) = *release_at
                && now >= deadline
            {
                *release_at = None;
                self.executor
                    .runner_mut()
                    .set_key(u4::new(key as u8), false);
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
        } else if self.executor.is_running() {
            self.handle_running_key(key);
        } else if key.kind == KeyEventKind::Press {
            self.handle_prompt_key(key);
        }
    }

    // While running, keys drive the CHIP-8 keypad and Esc breaks into the prompt.
    fn handle_running_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.executor.pause();
            self.output = format!("Paused at {:03X}", self.machine().pc());
            return;
        }

        let KeyCode::Char(c) = key.code else {
            return;
        };

        if let Some(idx) = KEY_MAP.iter().position(|&k| k == c.to_ascii_lowercase()) {
            self.executor.runner_mut().set_key(u4::new(idx as u8), true);
            self.key_release_at[idx] = Some(Instant::now() + KEY_HOLD);
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    /// Runs the typed command, or repeats the previous one on an empty line.
    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);

        let command = if line.trim().is_empty() {
            self.last_command.clone()
        } else {
            match Cli::try_parse_from(line.split_whitespace()) {
                Ok(cli) => Some(cli.command),
                Err(e) => {
                    self.output = e.to_string();
                    None
                }
            }
        };

        self.last_command = command.clone();
        if let Some(command) = command {
            self.run_command(command);
        }
    }

    fn run_command(&mut self, command: Command) {
        self.output = match self.executor.execute(command) {
            Ok(CommandResult::Quit) => {
                self.should_quit = true;
                return;
            }
            Ok(result) => format_result(result, self.machine().pc()),
            Err(e) => e.to_string(),
        };
    }
}

fn format_result(result: CommandResult, pc: u16) -> String {
    match result {
        CommandResult::Ok | CommandResult::Quit => "OK".to_string(),
        CommandResult::Breakpoints(addrs) if addrs.is_empty() => "No breakpoints".to_string(),
        CommandResult::Breakpoints(addrs) => {
            let list: Vec<String> = addrs.iter().map(|addr| format!("{addr:03X}")).collect();
            format!("Breakpoints: {}", list.join(" "))
        }
        CommandResult::MemDump { data, offset } => data
            .chunks(16)
            .enumerate()
            .map(|(row, bytes)| {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("{:03X}: {}", usize::from(offset) + row * 16, hex.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        CommandResult::Disasm { instructions } => instructions
            .iter()
            .map(|line| {
                let marker = if line.addr == pc { '>' } else { ' ' };
                format!("{marker}{:03X}: {:04X}  {}", line.addr, line.raw, line.text)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn panel(title: &str) -> Block<'static> {
    Block::bordered().title(format!(" {title} "))
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 3 + 3;

        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            Paragraph::new(format!("Terminal is too small ({MIN_WIDTH}x{MIN_HEIGHT} min)"))
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .block(Block::bordered())
                .render(area.centered(Constraint::Length(45), Constraint::Length(3)), buf);
            return;
        }

        let [main, side] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDE_WIDTH),
        ])
        .areas(area);

        let [display, output, input] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(main);

        let [state, registers, code, keypad, stack] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(8 + 3 + 2),
            Constraint::Length(CODE_LINES + 2),
            Constraint::Length(4 + 2),
            Constraint::Min(3),
        ])
        .areas(side);

        self.render_display(display, buf);
        Paragraph::new(self.output.as_str())
            .block(panel("Output"))
            .render(output, buf);
        Paragraph::new(format!("> {}", self.input))
            .block(panel("Command"))
            .render(input, buf);

        self.render_state(state, buf);
        self.render_registers(registers, buf);
        self.render_code(code, buf);
        self.render_keypad(keypad, buf);
        self.render_stack(stack, buf);
    }
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let lit = Style::default().fg(Color::Green);

        let lines: Vec<Line> = self
            .machine()
            .display()
            .rows()
            .map(|row| {
                let text: String = row.iter().map(|&on| if on { '█' } else { ' ' }).collect();
                Line::styled(text, lit)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(panel("Display"))
            .render(area, buf);
    }

    fn render_state(&self, area: Rect, buf: &mut Buffer) {
        let mut spans = vec![if self.executor.is_running() {
            Span::styled("RUNNING", Style::default().fg(Color::Green))
        } else {
            Span::styled("PAUSED", Style::default().fg(Color::Yellow))
        }];

        if self.machine().should_beep() {
            spans.push(Span::styled(" BEEP", Style::default().fg(Color::Magenta)));
        }

        Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .block(panel("State"))
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let machine = self.machine();
        let v = machine.v();

        let mut lines = vec![
            Line::from(format!("PC {:03X}    I {:03X}", machine.pc(), machine.index())),
            Line::from(format!(
                "DT {:02X}    ST {:02X}",
                machine.delay_timer(),
                machine.sound_timer()
            )),
            Line::from(""),
        ];
        lines.extend((0..8).map(|lo| {
            let hi = lo + 8;
            Line::from(format!("V{lo:X} {:02X}    V{hi:X} {:02X}", v[lo], v[hi]))
        }));

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(panel("Registers"))
            .render(area, buf);
    }

    /// A few instructions either side of PC, with breakpoints flagged.
    fn render_code(&self, area: Rect, buf: &mut Buffer) {
        let machine = self.machine();
        let pc = machine.pc();
        let first = pc.saturating_sub(2 * (CODE_LINES / 2));

        let lines: Vec<Line> = (0..CODE_LINES)
            .map(|n| first + 2 * n)
            .filter_map(|addr| {
                let raw = machine.memory().read_word(usize::from(addr)).ok()?;
                let flag = if self.executor.breakpoints().contains(&addr) { '*' } else { ' ' };
                let text = format!("{flag}{addr:03X} {}", Opcode::decode(raw));

                Some(if addr == pc {
                    Line::styled(text, Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    Line::from(text)
                })
            })
            .collect();

        Paragraph::new(lines).block(panel("Code")).render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let keypad = self.machine().keypad();
        let held = Style::default().fg(Color::Black).bg(Color::White);

        let lines: Vec<Line> = KEYPAD_LAYOUT
            .iter()
            .map(|row| {
                let mut spans = Vec::with_capacity(row.len() * 2);
                for (n, &key) in row.iter().enumerate() {
                    if n > 0 {
                        spans.push(Span::raw(" "));
                    }
                    let style = if keypad[usize::from(key)] { held } else { Style::default() };
                    spans.push(Span::styled(format!("{key:X}"), style));
                }
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(panel("Keypad"))
            .render(area, buf);
    }

    fn render_stack(&self, area: Rect, buf: &mut Buffer) {
        let frames = self.machine().stack().active();
        let rows = usize::from(area.height.saturating_sub(2)).max(1);

        // Innermost frames win when the panel is too short
        let lines: Vec<Line> = if frames.is_empty() {
            vec![Line::from("Empty")]
        } else if frames.len() > rows {
            std::iter::once(Line::from("..."))
                .chain(
                    frames
                        .iter()
                        .enumerate()
                        .skip(frames.len() - (rows - 1))
                        .map(|(depth, addr)| Line::from(format!("{depth:02}: {addr:03X}"))),
                )
                .collect()
        } else {
            frames
                .iter()
                .enumerate()
                .map(|(depth, addr)| Line::from(format!("{depth:02}: {addr:03X}")))
                .collect()
        };

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(panel("Stack"))
            .render(area, buf);
    }
}

/// Terminal debugger for CHIP-8 programs.
///
/// Type commands at the prompt (`help` lists them). While running, keys
/// 1-4, Q-R, A-F, Z-V drive the keypad and Esc pauses.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Path to the ROM file to load
    rom_path: PathBuf,

    /// Instructions executed per second while running
    #[arg(long, default_value_t = DEFAULT_CYCLE_HZ)]
    hz: f32,

    /// Seed for the random number instruction
    #[arg(long)]
    seed: Option<u64>,

    /// Log level; anything above `off` is written to stderr underneath the TUI
    #[arg(long, default_value = "off")]
    log: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    SimpleLogger::new()
        .with_level(args.log)
        .init()
        .context("Failed to initialize logger")?;

    let rom = load_rom(&args.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(rom, &args).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();

    result
}
