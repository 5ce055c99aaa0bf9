//! Byte-level terminal used by the shell.
//!
//! The CLI drives a real terminal through [`ShellConsole`]; tests use
//! [`HeadlessConsole`], which replays scripted keystrokes and records output.

use std::collections::VecDeque;

/// Terminal the shell prints to and reads keystrokes from.
pub trait ShellConsole: Send {
    fn write(&mut self, ch: u8);

    fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write(b);
        }
    }

    fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.write(b'\n');
    }

    /// Clear the screen. Terminals without one ignore it.
    fn clear(&mut self) {}

    /// True when a keystroke is waiting.
    fn has_key(&self) -> bool;

    /// Next keystroke, if one is waiting.
    fn get_key(&mut self) -> Option<u8>;

    /// Block until a keystroke arrives. 0 means input is closed.
    fn wait_for_key(&mut self) -> u8 {
        loop {
            if let Some(key) = self.get_key() {
                return key;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

/// Scripted console: keystrokes come from a fixed buffer, output is kept.
#[derive(Default)]
pub struct HeadlessConsole {
    output: Vec<u8>,
    keys: VecDeque<u8>,
    clears: usize,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Console that will type `keys`, then report end of input.
    pub fn with_input(keys: &[u8]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Screen clears requested so far.
    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl ShellConsole for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    fn wait_for_key(&mut self) -> u8 {
        self.keys.pop_front().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_appends_newline() {
        let mut console = HeadlessConsole::new();
        console.write(b'>');
        console.write_line(" ls");
        assert_eq!(console.output_string(), "> ls\n");
    }

    #[test]
    fn test_scripted_keys_then_eof() {
        let mut console = HeadlessConsole::with_input(b"yn");
        assert!(console.has_key());
        assert_eq!(console.get_key(), Some(b'y'));
        assert_eq!(console.wait_for_key(), b'n');
        assert!(!console.has_key());
        assert_eq!(console.get_key(), None);
        assert_eq!(console.wait_for_key(), 0);
    }

    #[test]
    fn test_clear_is_counted() {
        let mut console = HeadlessConsole::new();
        console.clear();
        console.clear();
        assert_eq!(console.clears(), 2);
        assert!(console.output_string().is_empty());
    }
}
