//! Interactive command shell over a shared volume.
//!
//! The shell reads lines from a [`ShellConsole`], parses them into a
//! [`Command`] and prints one status line per operation. Errors never stop
//! the shell; they are printed as `Error: <message>`.

mod command;

pub use command::{AutorunArg, Command, HELP};

use std::collections::VecDeque;

use log::debug;

use crate::config;
use crate::console::ShellConsole;
use crate::device::BlockDevice;
use crate::error::FsResult;
use crate::layout::InstallLayout;
use crate::shared::SharedVolume;
use crate::table::EntrySize;

/// Login attempts before the shell gives up.
pub const LOGIN_ATTEMPTS: usize = 3;

/// Command lines kept for `history`.
pub const HISTORY_LEN: usize = 10;

const KEY_EOF: u8 = 0;
const KEY_CTRL_C: u8 = 0x03;
const KEY_CTRL_D: u8 = 0x04;
const KEY_BACKSPACE: u8 = 0x08;
const KEY_DELETE: u8 = 0x7F;

/// What the caller should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellControl {
    Continue,
    Exit,
}

/// Command shell bound to a console and a volume.
pub struct Shell<C: ShellConsole, D: BlockDevice> {
    console: C,
    volume: SharedVolume<D>,
    layout: Option<InstallLayout>,
    history: VecDeque<String>,
}

impl<C: ShellConsole, D: BlockDevice> Shell<C, D> {
    pub fn new(console: C, volume: SharedVolume<D>) -> Self {
        Self {
            console,
            volume,
            layout: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Layout used by `install` instead of the built-in one.
    pub fn with_layout(mut self, layout: InstallLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn volume(&self) -> &SharedVolume<D> {
        &self.volume
    }

    /// Recent non-blank command lines, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Boot sequence: login gate, autorun, then the read-eval loop until
    /// `exit` or end of input.
    pub fn run(&mut self) -> FsResult<()> {
        if !self.login()? {
            return Ok(());
        }
        if self.autorun()? == ShellControl::Exit {
            return Ok(());
        }

        loop {
            let prompt = format!("{}> ", self.volume.cwd()?);
            self.console.write_str(&prompt);
            let Some(line) = self.read_line(false) else {
                self.console.write(b'\n');
                break;
            };
            if self.execute(&line) == ShellControl::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Ask for the password when one is set. Returns false when every
    /// attempt failed or input ended.
    pub fn login(&mut self) -> FsResult<bool> {
        if self.volume.read(|v| config::password(v).is_none())? {
            return Ok(true);
        }

        for _ in 0..LOGIN_ATTEMPTS {
            self.console.write_str("Enter password: ");
            let Some(typed) = self.read_line(true) else {
                return Ok(false);
            };
            if self.volume.read(|v| config::check_password(v, &typed))? {
                self.console.write_line("Login successful!");
                return Ok(true);
            }
            self.console.write_line("Incorrect password, try again.");
        }
        self.console.write_line("Too many failed attempts.");
        Ok(false)
    }

    /// Run the boot command, keeping the current directory unchanged.
    pub fn autorun(&mut self) -> FsResult<ShellControl> {
        let Some(command) = self.volume.read(config::autorun_command)? else {
            return Ok(ShellControl::Continue);
        };

        let cwd = self.volume.cwd()?;
        self.console
            .write_line(&format!("Executing autorun: '{}'", command));
        let control = self.execute(&command);
        if self
            .volume
            .change_directory(&format!("/{}", cwd))
            .is_err()
        {
            debug!("autorun removed {}", cwd);
        }
        Ok(control)
    }

    /// Parse and run one line.
    pub fn execute(&mut self, line: &str) -> ShellControl {
        self.remember(line);
        let command = Command::parse(line);
        debug!("shell: {:?}", command);
        match self.dispatch(command) {
            Ok(control) => control,
            Err(e) => {
                self.console.write_line(&format!("Error: {}", e));
                ShellControl::Continue
            }
        }
    }

    fn remember(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }

    fn dispatch(&mut self, command: Command) -> FsResult<ShellControl> {
        match command {
            Command::Help => {
                for line in HELP {
                    self.console.write_line(line);
                }
            }
            Command::Echo(text) => self.console.write_line(&text),
            Command::Ls(None) => {
                let cwd = self.volume.cwd()?;
                let entries = self.volume.list()?;
                self.console.write_line(&format!("Contents of {}:", cwd));
                for entry in entries {
                    self.console.write_line(&entry.to_string());
                }
            }
            Command::Ls(Some(dir)) => {
                let entries = self.volume.read(|v| v.list_dir(&dir))??;
                self.console.write_line(&format!("Contents of {}:", dir));
                for entry in entries {
                    self.console.write_line(&entry.to_string());
                }
            }
            Command::Cd(dir) => self.volume.change_directory(&dir)?,
            Command::Mkdir(name) => {
                self.volume.make_directory(&name)?;
                self.console
                    .write_line(&format!("Directory '{}' created", name));
            }
            Command::Touch(name) => {
                self.volume.create_file(&name)?;
                self.console.write_line(&format!("File '{}' created", name));
            }
            Command::Rm(name) => {
                let removed = self.volume.remove(&name)?;
                match removed.len() {
                    1 => self.console.write_line(&format!("'{}' removed", name)),
                    n => self.console.write_line(&format!(
                        "'{}' removed ({} entries below it)",
                        name,
                        n - 1
                    )),
                }
            }
            Command::Copy { src, dest } => {
                self.volume.copy(&src, &dest)?;
                self.console
                    .write_line(&format!("File copied to '{}'", dest));
            }
            Command::Cat(name) => {
                let data = self.volume.read_file(&name)?;
                if data.is_empty() {
                    self.console.write_line("File is empty");
                } else {
                    let text = String::from_utf8_lossy(&data);
                    self.console.write_str(&text);
                    if !text.ends_with('\n') {
                        self.console.write(b'\n');
                    }
                }
            }
            Command::Write { path, text } => {
                let text = text.replace("\\n", "\n");
                self.volume.write_file(&path, text.as_bytes())?;
                self.console
                    .write_line(&format!("Wrote {} bytes to '{}'", text.len(), path));
            }
            Command::Size(name) => match self.volume.size(&name)? {
                EntrySize::File(n) => self.console.write_line(&format!("File size: {} Bytes", n)),
                EntrySize::Directory(n) => {
                    self.console.write_line(&format!("Folder size: {} Bytes", n))
                }
            },
            Command::Find(pattern) => {
                let hits: Vec<String> = self.volume.read(|v| {
                    v.find(&pattern)
                        .iter()
                        .map(|r| {
                            if r.is_dir() && !r.is_root() {
                                format!("{}/", r.name())
                            } else {
                                r.name().to_string()
                            }
                        })
                        .collect()
                })?;
                self.console.write_line(&format!("Searching for: {}", pattern));
                for hit in hits {
                    self.console.write_line(&hit);
                }
            }
            Command::Pwd => {
                let cwd = self.volume.cwd()?;
                self.console.write_line(&cwd);
            }
            Command::Format => self.format()?,
            Command::Fsck => self.fsck()?,
            Command::Autorun(arg) => self.autorun_command(arg)?,
            Command::Install => self.install()?,
            Command::History => {
                self.console.write_line("Command History:");
                for (i, line) in self.history.iter().enumerate() {
                    self.console.write_line(&format!("{}: {}", i + 1, line));
                }
            }
            Command::Clear => self.console.clear(),
            Command::Exit => return Ok(ShellControl::Exit),
            Command::Empty => {}
            Command::Usage(usage) => self.console.write_line(usage),
            Command::Unknown(word) => self.console.write_line(&format!(
                "Unknown command: {}. Type 'help' for a list of commands.",
                word
            )),
        }
        Ok(ShellControl::Continue)
    }

    fn format(&mut self) -> FsResult<()> {
        self.console
            .write_line("WARNING: This will erase ALL files and directories!");
        if !self.confirm("Are you sure you want to continue? (y/N): ") {
            self.console.write_line("Format cancelled.");
            return Ok(());
        }
        self.console.write_line("Formatting filesystem...");
        self.volume.write(|v| v.format())?;
        self.console.write_line("Filesystem formatted successfully.");
        Ok(())
    }

    fn fsck(&mut self) -> FsResult<()> {
        self.console.write_line("Filesystem Consistency Check");
        self.console.write_line("============================");
        if !self.confirm("Continue? (y/N): ") {
            self.console.write_line("Operation cancelled.");
            return Ok(());
        }
        self.console.write_line("Checking filesystem integrity...");
        let report = self.volume.check_integrity()?;
        for line in report.lines() {
            self.console.write_line(&line);
        }
        Ok(())
    }

    fn autorun_command(&mut self, arg: AutorunArg) -> FsResult<()> {
        match arg {
            AutorunArg::List => {
                let command = self.volume.read(config::autorun_command)?;
                let status = if command.is_some() { "ENABLED" } else { "DISABLED" };
                self.console
                    .write_line(&format!("AutoRun status: {}", status));
                self.console.write_line(&format!(
                    "Command: {}",
                    command.as_deref().unwrap_or("<not set>")
                ));
            }
            AutorunArg::On(command) => {
                self.volume
                    .write(|v| config::enable_autorun(v, &command))?;
                self.console
                    .write_line(&format!("AutoRun enabled: '{}'", command));
            }
            AutorunArg::Off => {
                self.volume.write(config::disable_autorun)?;
                self.console.write_line("AutoRun disabled");
            }
        }
        Ok(())
    }

    fn install(&mut self) -> FsResult<()> {
        self.console
            .write_line("WARNING: Installing erases the volume and lays down the system tree.");
        if !self.confirm("Continue? (y/N): ") {
            self.console.write_line("Installation cancelled.");
            return Ok(());
        }

        let mut password = None;
        if self.confirm("Do you want to set a password for your user? Y/N: ") {
            loop {
                self.console.write_str("Enter the password: ");
                let Some(first) = self.read_line(true) else {
                    self.console.write_line("Installation cancelled.");
                    return Ok(());
                };
                self.console.write_str("Enter the password again: ");
                let Some(second) = self.read_line(true) else {
                    self.console.write_line("Installation cancelled.");
                    return Ok(());
                };
                if first == second {
                    self.console.write_line("Password set successfully!");
                    password = Some(first);
                    break;
                }
                self.console
                    .write_line("Passwords do not match. Try again.");
            }
        }

        let layout = match &self.layout {
            Some(layout) => layout.clone(),
            None => InstallLayout::system()?,
        };
        self.console.write_line("Formatting disks to WexFS...");
        let summary = self
            .volume
            .write(|v| v.install(&layout, password.as_deref()))?;
        self.console.write_line(&format!(
            "Installation completed: {} directories, {} files.",
            summary.directories, summary.files
        ));
        Ok(())
    }

    /// Read one `y`/`Y` key.
    fn confirm(&mut self, prompt: &str) -> bool {
        self.console.write_str(prompt);
        let key = self.console.wait_for_key();
        if key.is_ascii_graphic() {
            self.console.write(key);
        }
        self.console.write(b'\n');
        key.eq_ignore_ascii_case(&b'y')
    }

    /// Read a line with backspace editing. Masked input echoes `*`.
    ///
    /// Returns None at end of input.
    fn read_line(&mut self, masked: bool) -> Option<String> {
        let mut line = String::new();
        loop {
            match self.console.wait_for_key() {
                KEY_EOF => {
                    return if line.is_empty() { None } else { Some(line) };
                }
                KEY_CTRL_D if line.is_empty() => return None,
                KEY_CTRL_C => {
                    self.console.write_str("^C\n");
                    return Some(String::new());
                }
                b'\r' | b'\n' => {
                    self.console.write(b'\n');
                    return Some(line);
                }
                KEY_BACKSPACE | KEY_DELETE => {
                    if line.pop().is_some() {
                        self.console.write_str("\x08 \x08");
                    }
                }
                key if key == b' ' || key.is_ascii_graphic() => {
                    line.push(key as char);
                    self.console.write(if masked { b'*' } else { key });
                }
                _ => {}
            }
        }
    }
}
