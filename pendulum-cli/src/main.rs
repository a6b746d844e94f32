//! pendulum - TUI and CLI for the damped pendulum simulator
//!
//! Usage:
//!   pendulum [-c config.yaml]        Launch TUI
//!   pendulum run [options]           Simulate headless and write plots
//!   pendulum help                    Show usage

mod cli;

use std::env;
use std::io::{self, stdout};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::DynamicImage;
use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{
        Block, Borders, Paragraph, Tabs,
        canvas::{Canvas, Circle, Line as CanvasLine},
    },
};
use ratatui_image::{
    StatefulImage,
    picker::{Picker, ProtocolType},
    protocol::StatefulProtocol,
};

use pendulum::{
    DisplayUpdate, PivotPoint, PlotKind, PlotSet, RealTimePacer, RunEvent, Simulation,
    StartRequest, project,
};

use cli::SimConfig;
use cli::common::cycle;

/// Form field captions, in `StartRequest::parse` order.
const FIELD_LABELS: [&str; 6] = [
    "Length, m",
    "Mass, kg",
    "g, m/s²",
    "Damping",
    "Angle, °",
    "Ang. vel, °/s",
];

/// Bob radius in display units
const BOB_RADIUS: f64 = 25.0;
const PIVOT_RADIUS: f64 = 5.0;

/// Application state for TUI
struct App {
    /// Loaded configuration (defaults for the form, pacing, output)
    config: SimConfig,
    /// Raw text of the six parameter fields
    fields: [String; 6],
    /// Which field receives typed characters
    field_focus: usize,
    /// Run controller
    sim: Simulation,
    /// Events from the run loop
    events: Receiver<RunEvent>,
    /// Run whose events we are showing
    run_id: Option<u64>,
    /// Latest per-step values from the loop
    display: Option<DisplayUpdate>,
    /// 0 = animation, 1.. = plot tabs
    tab: usize,
    /// Plots from the last settle/stop
    plots: Option<PlotSet>,
    /// Terminal image state, one per plot tab
    plot_images: Vec<Box<dyn StatefulProtocol>>,
    /// Image picker for terminal protocol detection
    picker: Picker,
    /// One-line status message
    status: String,
    /// Should exit
    should_quit: bool,
}

impl App {
    fn new(config: SimConfig) -> Self {
        let pacer = RealTimePacer::new(config.frame_interval());
        let (sim, events) = Simulation::new(config.pivot(), Arc::new(pacer));
        let sim = sim.with_renderer(config.renderer());

        // Initialize image picker - force Sixel protocol
        let mut picker = Picker::from_termios().unwrap_or_else(|_| Picker::new((8, 16)));
        picker.protocol_type = ProtocolType::Sixel;

        App {
            fields: config.form_fields(),
            config,
            field_focus: 0,
            sim,
            events,
            run_id: None,
            display: None,
            tab: 0,
            plots: None,
            plot_images: Vec::new(),
            picker,
            status: "Enter to start".to_string(),
            should_quit: false,
        }
    }

    fn pivot(&self) -> PivotPoint {
        self.config.pivot()
    }

    /// Start (or restart) a run from the form. Bad input is ignored.
    fn start(&mut self) {
        let request = match StartRequest::parse(self.fields.each_ref().map(String::as_str), self.config.time_step) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("start ignored: {}", e);
                return;
            }
        };
        match self.sim.start(request) {
            Ok(run_id) => {
                self.run_id = Some(run_id);
                self.display = None;
                self.status = format!("Run {} running", run_id);
            }
            Err(e) => log::debug!("start rejected: {}", e),
        }
    }

    /// Stop the running loop and plot what it logged.
    fn stop(&mut self) {
        match self.sim.stop_and_render() {
            Some(Ok(plots)) => {
                self.status = "Stopped".to_string();
                self.set_plots(plots);
            }
            Some(Err(e)) => {
                log::warn!("plot rendering failed: {}", e);
                self.status = format!("Plot error: {}", e);
            }
            None => {}
        }
    }

    fn quit(&mut self) {
        self.sim.shutdown();
        self.should_quit = true;
    }

    fn set_plots(&mut self, plots: PlotSet) {
        let picker = &mut self.picker;
        self.plot_images = plots
            .iter()
            .map(|(_, artifact)| picker.new_resize_protocol(DynamicImage::ImageRgba8(artifact.image.clone())))
            .collect();
        self.plots = Some(plots);
    }

    fn check_events(&mut self) {
        // Drain everything pending; events from retired runs are dropped
        let pending: Vec<RunEvent> = self.events.try_iter().collect();
        for event in pending {
            if Some(event.run_id()) != self.run_id {
                continue;
            }
            match event {
                RunEvent::Tick { update, .. } => self.display = Some(update),
                RunEvent::Settled { iterations, plots, .. } => {
                    self.status = format!("Settled after {} steps", iterations);
                    match plots {
                        Some(Ok(plots)) => self.set_plots(plots),
                        Some(Err(e)) => self.status = format!("Plot error: {}", e),
                        None => {}
                    }
                }
                RunEvent::Stopped { .. } => {}
            }
        }
    }

    fn type_char(&mut self, c: char) {
        if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E') {
            self.fields[self.field_focus].push(c);
        }
    }

    fn backspace(&mut self) {
        self.fields[self.field_focus].pop();
    }

    fn move_focus(&mut self, delta: isize) {
        self.field_focus = cycle(self.field_focus, delta, self.fields.len());
    }

    fn switch_tab(&mut self, delta: isize) {
        self.tab = cycle(self.tab, delta, PlotKind::all().len() + 1);
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();

    // Check for CLI subcommands
    if args.len() >= 2 {
        match args[1].as_str() {
            "run" => {
                cli::cmd_run(&args[2..]);
                return;
            }
            "help" | "--help" | "-h" => {
                print_usage(&args[0]);
                return;
            }
            _ => {}
        }
    }

    let config = match load_tui_config(&args[1..]) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_tui(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_tui_config(args: &[String]) -> Result<SimConfig, String> {
    match args {
        [] => Ok(SimConfig::default()),
        [flag, path] if flag == "-c" || flag == "--config" => SimConfig::load(path).map_err(|e| e.to_string()),
        _ => Err(format!("Unexpected arguments: {}. See 'pendulum help'.", args.join(" "))),
    }
}

fn print_usage(prog: &str) {
    eprintln!("pendulum - damped pendulum simulator");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} [-c config.yaml]        Launch TUI", prog);
    eprintln!("  {} run [options]           Simulate headless and write plots", prog);
    eprintln!("  {} help                    Show this help", prog);
    eprintln!();
    cli::run::print_usage();
    eprintln!();
    eprintln!("TUI Controls:");
    eprintln!("  Tab / ↑↓       Select parameter field");
    eprintln!("  0-9 . - e      Edit field, Backspace to delete");
    eprintln!("  Enter          Start (restarts a running simulation)");
    eprintln!("  Space          Stop and plot");
    eprintln!("  ← / →          Switch animation / plot tabs");
    eprintln!("  q / Esc        Quit");
    eprintln!();
    eprintln!("Logging: set RUST_LOG (e.g. RUST_LOG=info) to see run events on stderr.");
}

fn run_tui(config: SimConfig) -> Result<(), String> {
    // Initialize terminal
    enable_raw_mode().map_err(|e| e.to_string())?;
    stdout().execute(EnterAlternateScreen).map_err(|e| e.to_string())?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout())).map_err(|e| e.to_string())?;

    let mut app = App::new(config);

    // Main loop
    let result = run_app(&mut terminal, &mut app);
    app.sim.shutdown();

    // Restore terminal
    disable_raw_mode().map_err(|e| e.to_string())?;
    stdout().execute(LeaveAlternateScreen).map_err(|e| e.to_string())?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<(), String> {
    loop {
        // Pick up loop progress (non-blocking)
        app.check_events();

        terminal.draw(|frame| ui(frame, app)).map_err(|_| "Draw error".to_string())?;

        if event::poll(Duration::from_millis(30)).map_err(|e| e.to_string())? {
            if let Event::Key(key) = event::read().map_err(|e| e.to_string())? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Enter => app.start(),
                        KeyCode::Char(' ') => app.stop(),
                        KeyCode::Tab | KeyCode::Down => app.move_focus(1),
                        KeyCode::BackTab | KeyCode::Up => app.move_focus(-1),
                        KeyCode::Left => app.switch_tab(-1),
                        KeyCode::Right => app.switch_tab(1),
                        KeyCode::Backspace => app.backspace(),
                        KeyCode::Char(c) => app.type_char(c),
                        _ => {}
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &mut App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(5),
        ])
        .split(frame.area());

    // Tabs
    let mut titles = vec!["Animation".to_string()];
    titles.extend(PlotKind::all().iter().map(|kind| kind.caption().to_string()));
    let tabs = Tabs::new(titles)
        .select(app.tab)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, main_layout[0]);

    if app.tab == 0 {
        draw_animation(frame, app, main_layout[1]);
    } else {
        draw_plot(frame, app, main_layout[1]);
    }

    // Parameter fields
    let field_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(main_layout[2]);

    for (i, (label, text)) in FIELD_LABELS.iter().zip(app.fields.iter()).enumerate() {
        let style = if i == app.field_focus {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        let field = Paragraph::new(text.as_str())
            .style(style)
            .block(Block::default().title(format!(" {} ", label)).borders(Borders::ALL).border_style(style));
        frame.render_widget(field, field_layout[i]);
    }

    // Live readouts and help
    let bottom_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_layout[3]);

    let readout = match &app.display {
        Some(update) => format!(
            "{}\n{}\n{}",
            update.time_label(),
            update.angle_label(),
            update.angular_velocity_label()
        ),
        None => "Time: 0.00 s\nAngle: 0.00°\nAngular velocity: 0 deg/s".to_string(),
    };
    let readout = Paragraph::new(readout)
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(format!(" {} ", app.status))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        );
    frame.render_widget(readout, bottom_layout[0]);

    let help = Paragraph::new("Enter start  Space stop  q quit\nTab/↑↓ field  ←→ tabs\n0-9 . - e edit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(help, bottom_layout[1]);
}

fn draw_animation(frame: &mut Frame, app: &App, area: Rect) {
    let pivot = app.pivot();
    let origin = pivot.origin();
    let bob = match &app.display {
        Some(update) => update.position,
        None => project(0.0, pivot),
    };

    // Display coordinates grow downwards; the canvas grows upwards.
    let reach = pivot.arm_length + BOB_RADIUS * 1.5;
    let running = app.sim.is_running();
    let border_color = if running { Color::Yellow } else { Color::Green };

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(if running { " Running " } else { " Idle " })
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        )
        .marker(Marker::Braille)
        .x_bounds([origin.x - reach, origin.x + reach])
        .y_bounds([-(origin.y + reach), -(origin.y - reach)])
        .paint(move |ctx| {
            ctx.draw(&CanvasLine {
                x1: origin.x,
                y1: -origin.y,
                x2: bob.x,
                y2: -bob.y,
                color: Color::Gray,
            });
            ctx.draw(&Circle {
                x: origin.x,
                y: -origin.y,
                radius: PIVOT_RADIUS,
                color: Color::White,
            });
            ctx.draw(&Circle {
                x: bob.x,
                y: -bob.y,
                radius: BOB_RADIUS,
                color: Color::Blue,
            });
        });
    frame.render_widget(canvas, area);
}

fn draw_plot(frame: &mut Frame, app: &mut App, area: Rect) {
    let kind = PlotKind::all()[app.tab - 1];
    let title = match app.plots.as_ref().map(|plots| plots.get(kind)) {
        Some(artifact) => format!(
            " {}: {} vs {} ({}x{}) ",
            artifact.title, artifact.y_label, artifact.x_label, artifact.width, artifact.height
        ),
        None => format!(" {} ", kind.title()),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    match app.plot_images.get_mut(app.tab - 1) {
        Some(image_state) => {
            frame.render_stateful_widget(StatefulImage::new(None), inner, image_state);
        }
        None => {
            let hint = Paragraph::new("No plots yet: start a run and let it settle, or press Space to stop.")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center);
            frame.render_widget(hint, inner);
        }
    }
}
