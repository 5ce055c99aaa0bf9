//! WexFS CLI - Run the WexFS shell on a disk image.
//!
//! Usage:
//!   wexfs <image> [options] [-- command args]
//!
//! Examples:
//!   wexfs disk.img --create              # Create a blank image and open the shell
//!   wexfs disk.img --install             # Lay down the standard system tree first
//!   wexfs disk.img -- ls                 # Run one command and exit
//!   wexfs disk.img --scratch             # Experiment without touching the image
//!   wexfs disk.img --fsck-json           # Print the integrity report as JSON

use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use tokio::sync::mpsc as tokio_mpsc;

use wexfs_core::{
    BlockDevice, FileDisk, InstallLayout, OverlayDisk, RemovePolicy, SharedVolume, Shell,
    ShellConsole, Volume, MIN_IMAGE_SECTORS,
};

/// Device type the CLI mounts: the image itself or a scratch overlay on it.
type Disk = Box<dyn BlockDevice + Sync>;

/// WexFS shell CLI
#[derive(Parser, Debug)]
#[command(name = "wexfs")]
#[command(about = "Run the WexFS shell on a disk image")]
struct Args {
    /// Disk image file
    image: PathBuf,

    /// Create the image if it does not exist
    #[arg(long)]
    create: bool,

    /// Image size in sectors when creating
    #[arg(long, default_value_t = 2048)]
    sectors: u32,

    /// Log filesystem activity to stderr
    #[arg(short, long)]
    trace: bool,

    /// Keep all writes in memory; the image is left untouched
    #[arg(long)]
    scratch: bool,

    /// What `rm` does with directories
    #[arg(long, default_value = "recursive")]
    rm_policy: RemovePolicy,

    /// Format the image and install the system layout before starting
    #[arg(long)]
    install: bool,

    /// Layout manifest (JSON) used by --install and the `install` command
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Login password set by --install
    #[arg(long, requires = "install")]
    password: Option<String>,

    /// Print the integrity report as JSON and exit
    #[arg(long)]
    fsck_json: bool,

    /// Command and arguments to run (instead of the interactive shell)
    #[arg(last = true)]
    command: Vec<String>,
}

/// Logger printing `[FS]` lines to stderr.
struct TraceLogger;

static LOGGER: TraceLogger = TraceLogger;

impl Log for TraceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Raw mode needs an explicit carriage return
        match record.level() {
            Level::Warn | Level::Error => {
                eprint!("[FS] {}: {}\r\n", record.level(), record.args())
            }
            _ => eprint!("[FS] {}\r\n", record.args()),
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn init_logging(trace: bool) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if trace {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
    }
}

/// Channel-based console fed by the terminal input task.
struct ChannelConsole {
    /// Receiver for keyboard input
    key_rx: mpsc::Receiver<u8>,
    /// Pending keys (buffered)
    key_buffer: Vec<u8>,
    /// Translate LF to CR LF for raw-mode terminals
    raw: bool,
}

impl ChannelConsole {
    fn new(key_rx: mpsc::Receiver<u8>, raw: bool) -> Self {
        Self {
            key_rx,
            key_buffer: Vec::new(),
            raw,
        }
    }
}

impl ShellConsole for ChannelConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        let _ = match ch {
            b'\n' if self.raw => handle.write_all(b"\r\n"),
            _ => handle.write_all(&[ch]),
        };
        let _ = handle.flush();
    }

    fn clear(&mut self) {
        let _ = execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0));
    }

    fn has_key(&self) -> bool {
        !self.key_buffer.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        if !self.key_buffer.is_empty() {
            return Some(self.key_buffer.remove(0));
        }
        self.key_rx.try_recv().ok()
    }

    fn wait_for_key(&mut self) -> u8 {
        if !self.key_buffer.is_empty() {
            return self.key_buffer.remove(0);
        }

        // Blocking receive; a closed channel is end of input
        self.key_rx.recv().unwrap_or(0)
    }
}

/// Translate crossterm key events to shell key codes.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64); // Ctrl+C=3, Ctrl+D=4
            }
        }
    }

    match code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Delete => Some(0x7F),
        KeyCode::Tab => Some(b' '),
        _ => None,
    }
}

/// Open (or create) the image and wrap it for scratch mode if asked.
fn open_disk(args: &Args) -> Result<Disk, Box<dyn std::error::Error>> {
    let file = if args.create {
        FileDisk::create(&args.image, args.sectors)?
    } else if args.image.exists() {
        FileDisk::open(&args.image)?
    } else {
        return Err(format!(
            "{} does not exist (use --create to make a new image)",
            args.image.display()
        )
        .into());
    };

    let sectors = file.sector_count()?;
    if sectors < MIN_IMAGE_SECTORS as u64 {
        log::warn!(
            "image has {} sectors, a full table needs {}",
            sectors,
            MIN_IMAGE_SECTORS
        );
    }

    let disk: Disk = if args.scratch {
        Box::new(OverlayDisk::new(file))
    } else {
        Box::new(file)
    };
    Ok(disk)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.trace);

    let layout = match &args.layout {
        Some(path) => Some(InstallLayout::from_path(path)?),
        None => None,
    };

    let mut volume = Volume::open(open_disk(&args)?)?.with_remove_policy(args.rm_policy);
    log::debug!(
        "mounted {} ({} records, rm policy {:?})",
        args.image.display(),
        volume.table().len(),
        args.rm_policy
    );

    if args.install {
        let layout = match &layout {
            Some(layout) => layout.clone(),
            None => InstallLayout::system()?,
        };
        let summary = volume.install(&layout, args.password.as_deref())?;
        eprintln!(
            "Installed {} directories, {} files",
            summary.directories, summary.files
        );
    }

    if args.fsck_json {
        let report = volume.check_integrity();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let volume = SharedVolume::new(volume);

    // One-shot mode: no login, no autorun, confirmations read as "no"
    if !args.command.is_empty() {
        let (_, key_rx) = mpsc::channel::<u8>();
        let mut shell = Shell::new(ChannelConsole::new(key_rx, false), volume);
        if let Some(layout) = layout {
            shell = shell.with_layout(layout);
        }
        shell.execute(&args.command.join(" "));
        return Ok(());
    }

    // Create channel for keyboard input
    let (key_tx, key_rx) = mpsc::channel::<u8>();

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = tokio_mpsc::channel::<()>(1);

    // Enable raw mode (gracefully handle non-TTY)
    let raw_mode_enabled = enable_raw_mode().is_ok();

    let console = ChannelConsole::new(key_rx, raw_mode_enabled);
    let mut shell = Shell::new(console, volume.clone());
    if let Some(layout) = layout {
        shell = shell.with_layout(layout);
    }

    // Spawn shell in blocking task
    let shell_handle = tokio::task::spawn_blocking(move || shell.run());

    // Spawn terminal input reader
    let input_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    if event::poll(Duration::from_millis(0)).unwrap_or(false) {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind == KeyEventKind::Release {
                                continue;
                            }
                            if let Some(ch) = translate_key(key_event.code, key_event.modifiers) {
                                if key_tx.send(ch).is_err() {
                                    break; // Channel closed
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    // Wait for the shell to finish
    let result = shell_handle.await?;

    // Signal input handler to stop
    let _ = shutdown_tx.send(()).await;
    let _ = input_handle.await;

    if raw_mode_enabled {
        let _ = disable_raw_mode();
    }

    if let Err(e) = result {
        eprintln!("\nError: {}", e);
    }
    if let Ok(report) = volume.check_integrity() {
        log::debug!("filesystem is {}", report.verdict());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_key() {
        assert_eq!(translate_key(KeyCode::Char('a'), KeyModifiers::NONE), Some(b'a'));
        assert_eq!(
            translate_key(KeyCode::Char('d'), KeyModifiers::CONTROL),
            Some(0x04)
        );
        assert_eq!(translate_key(KeyCode::Enter, KeyModifiers::NONE), Some(b'\r'));
        assert_eq!(translate_key(KeyCode::Char('é'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "wexfs",
            "disk.img",
            "--rm-policy",
            "reject-non-empty",
            "--",
            "mkdir",
            "home",
        ])
        .unwrap();
        assert_eq!(args.rm_policy, RemovePolicy::RejectNonEmpty);
        assert_eq!(args.command, vec!["mkdir", "home"]);
        assert_eq!(args.sectors, 2048);
        assert!(Args::try_parse_from(["wexfs", "disk.img", "--password", "x"]).is_err());
    }
}
