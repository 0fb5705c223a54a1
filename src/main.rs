//! Groove Pedal - footswitch-driven drum pattern player.
//!
//! Listens for pedal presses on a MIDI input (Note On `base + n` selects
//! pattern `n`), plays the selected pattern's grooves and fills to a MIDI
//! output, and shows the playing and queued patterns.

mod clock;
mod config;
mod engine;
mod import;
mod midi;
mod pattern;
mod playback;
mod scheduler;
mod track;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use iced::time::{self, milliseconds};
use iced::widget::{button, column, container, row, text};
use iced::{Center, Color, Element, Fill, Subscription, Theme};
use midir::{MidiInput, MidiInputConnection};

use config::{load_song, PlayerConfig};
use engine::Player;
use midi::{choose_port, trigger_pedal, MidiOut};
use pattern::Song;
use playback::Status;
use scheduler::{DeadlineScheduler, Scheduler};
use ui::pattern_table::{view_pattern_table, PatternRow};

/// Kick, snare, open hat, ride.
const AUDITION_NOTES: [(u8, &str); 4] = [(36, "Kick"), (38, "Snare"), (46, "Hat"), (51, "Ride")];

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let scheduler: Arc<dyn Scheduler> = match DeadlineScheduler::new("segments") {
        Ok(scheduler) => Arc::new(scheduler),
        Err(e) => {
            log::error!("failed to start segment scheduler: {}", e);
            std::process::exit(1);
        }
    };

    iced::application(
        move || GroovePedal::new(Arc::clone(&scheduler)),
        GroovePedal::update,
        GroovePedal::view,
    )
    .title("Groove Pedal")
    .subscription(GroovePedal::subscription)
    .theme(GroovePedal::theme)
    .run()
}

struct GroovePedal {
    player: Player,
    status: Status,
    status_rx: Receiver<Status>,
    config_path: PathBuf,
    config: PlayerConfig,
    rows: Vec<PatternRow>,
    song_title: String,
    song_tempo: f64,
    output_port: Option<String>,
    input_port: Option<String>,
    _midi_connection: Option<MidiInputConnection<()>>,
}

#[derive(Debug, Clone, Copy)]
enum Message {
    Tick,
    Pedal(usize),
    Stop,
    Audition(u8),
    ReloadSong,
}

impl GroovePedal {
    fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let config_path = std::env::args()
            .nth(1)
            .map(PathBuf::from)
            .unwrap_or_else(PlayerConfig::default_path);
        let config = PlayerConfig::load(&config_path).unwrap_or_else(|e| {
            log::error!("{:#}", e);
            PlayerConfig::default()
        });

        let song = read_song(&config, &config_path);
        let (status_tx, status_rx) = crossbeam_channel::unbounded();
        let player = Player::new(song, scheduler, status_tx);

        let output_port = match MidiOut::connect(config.output_device.as_deref(), config.channel_nibble()) {
            Ok(out) => {
                let name = out.port_name.clone();
                player.attach_output(Box::new(out));
                Some(name)
            }
            Err(e) => {
                log::error!("{:#}", e);
                None
            }
        };

        let (midi_connection, input_port) = start_midi_listener(player.clone(), &config);

        // First run: write out a config naming the ports we ended up on
        if !config_path.exists() {
            let chosen = PlayerConfig {
                output_device: output_port.clone(),
                input_device: input_port.clone(),
                ..config.clone()
            };
            match chosen.save(&config_path) {
                Ok(()) => log::info!("wrote {}", config_path.display()),
                Err(e) => log::warn!("{:#}", e),
            }
        }

        let mut app = Self {
            status: player.status(),
            player,
            status_rx,
            config_path,
            config,
            rows: Vec::new(),
            song_title: String::new(),
            song_tempo: 0.0,
            output_port,
            input_port,
            _midi_connection: midi_connection,
        };
        app.refresh_song();
        app
    }

    fn refresh_song(&mut self) {
        let (rows, tempo) = self
            .player
            .with_song(|song| (PatternRow::from_song(song), song.tempo.bpm()));
        self.rows = rows;
        self.song_title = self.player.song_title();
        self.song_tempo = tempo;
    }

    fn update(&mut self, message: Message) {
        match message {
            Message::Tick => {
                // Playback runs on the scheduler thread, keep the latest status
                while let Ok(status) = self.status_rx.try_recv() {
                    self.status = status;
                }
            }
            Message::Pedal(pedal) => {
                if let Err(e) = self.player.request_pedal(pedal) {
                    log::warn!("{}", e);
                }
            }
            Message::Stop => self.player.stop(),
            Message::Audition(key) => self.player.audition(key),
            Message::ReloadSong => {
                let song = read_song(&self.config, &self.config_path);
                self.player.set_song(song);
                self.refresh_song();
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let playing = self.status.current.is_some();
        let now_playing = self.status.current.as_deref().unwrap_or("STOPPED");
        let status_color = if playing {
            Color::from_rgb(0.2, 0.8, 0.2)
        } else {
            Color::from_rgb(0.6, 0.6, 0.6)
        };
        let next = match self.status.queued.as_deref() {
            Some(name) => format!("Next: {}", name),
            None => String::new(),
        };

        let ports = format!(
            "In: {}   Out: {}",
            self.input_port.as_deref().unwrap_or("none"),
            self.output_port.as_deref().unwrap_or("none"),
        );

        let auditions = AUDITION_NOTES.iter().fold(row![].spacing(8), |r, (key, label)| {
            r.push(button(text(*label).size(14)).on_press(Message::Audition(*key)))
        });

        let content = column![
            text(format!("{} · {:.0} BPM", self.song_title, self.song_tempo)).size(32),
            text(ports).size(14),
            text("").size(10),
            text(now_playing).size(40).color(status_color),
            text(next).size(20).color(Color::from_rgb(0.9, 0.6, 0.2)),
            text("").size(10),
            view_pattern_table(&self.rows, &self.status, Message::Pedal),
            row![
                button(text("Stop").size(14)).on_press(Message::Stop),
                button(text("Reload song").size(14)).on_press(Message::ReloadSong),
                auditions,
            ]
            .spacing(16),
        ]
        .spacing(4)
        .align_x(Center);

        container(content)
            .width(Fill)
            .height(Fill)
            .center_x(Fill)
            .center_y(Fill)
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        time::every(milliseconds(50)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Load the configured song, falling back to an empty one.
fn read_song(config: &PlayerConfig, config_path: &std::path::Path) -> Song {
    let Some(path) = config.song_path(config_path) else {
        log::warn!("no song configured in {}", config_path.display());
        return Song::default();
    };
    match load_song(&path) {
        Ok(song) => {
            log::info!("loaded {:?} with {} patterns", song.title, song.patterns().len());
            song
        }
        Err(e) => {
            log::error!("{:#}", e);
            Song::default()
        }
    }
}

fn start_midi_listener(
    player: Player,
    config: &PlayerConfig,
) -> (Option<MidiInputConnection<()>>, Option<String>) {
    let midi_in = match MidiInput::new("groove-pedal-in") {
        Ok(m) => m,
        Err(e) => {
            log::error!("failed to create MIDI input: {}", e);
            return (None, None);
        }
    };

    let in_ports = midi_in.ports();
    let names: Vec<String> = in_ports
        .iter()
        .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "Unknown".into()))
        .collect();
    let Some(port_idx) = choose_port(&names, config.input_device.as_deref()) else {
        log::warn!("no MIDI input ports found");
        return (None, None);
    };
    let port_name = names[port_idx].clone();
    let base_note = config.trigger_base_note;

    let connection = midi_in.connect(
        &in_ports[port_idx],
        "groove-pedal-in",
        move |_timestamp, message, _| {
            if let Some(pedal) = trigger_pedal(message, base_note) {
                log::debug!("pedal {} pressed", pedal);
                if let Err(e) = player.request_pedal(pedal) {
                    log::debug!("pedal {} ignored: {}", pedal, e);
                }
            }
        },
        (),
    );

    match connection {
        Ok(conn) => {
            log::info!("listening for pedals on: {}", port_name);
            (Some(conn), Some(port_name))
        }
        Err(e) => {
            log::error!("failed to connect MIDI input {}: {}", port_name, e);
            (None, None)
        }
    }
}
