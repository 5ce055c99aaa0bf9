//! Shell command parsing.

/// Argument of the `autorun` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutorunArg {
    /// Show the current boot command.
    List,
    /// Set the boot command.
    On(String),
    /// Disable autorun.
    Off,
}

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Echo(String),
    /// List the current directory, or the named one.
    Ls(Option<String>),
    Cd(String),
    Mkdir(String),
    Touch(String),
    Rm(String),
    Copy { src: String, dest: String },
    Cat(String),
    Write { path: String, text: String },
    Size(String),
    Find(String),
    Pwd,
    Format,
    Fsck,
    Autorun(AutorunArg),
    Install,
    /// Show recent command lines.
    History,
    Clear,
    Exit,
    /// Blank line.
    Empty,
    /// Known command with missing or malformed arguments.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Parse one input line. The command word is case-insensitive; the
    /// argument is passed through verbatim apart from leading spaces.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        let (word, arg) = match line.find(char::is_whitespace) {
            Some(i) => (&line[..i], line[i..].trim_start()),
            None => (line, ""),
        };

        let required = |make: fn(String) -> Command, usage: &'static str| {
            if arg.is_empty() {
                Command::Usage(usage)
            } else {
                make(arg.to_string())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "help" => Command::Help,
            "echo" => Command::Echo(arg.to_string()),
            "ls" => Command::Ls(Some(arg).filter(|a| !a.is_empty()).map(str::to_string)),
            "cd" => required(Command::Cd, "Usage: cd <directory>"),
            "mkdir" => required(Command::Mkdir, "Usage: mkdir <name>"),
            "touch" => required(Command::Touch, "Usage: touch <name>"),
            "rm" => required(Command::Rm, "Usage: rm <name>"),
            "cat" => required(Command::Cat, "Usage: cat <file>"),
            "size" => required(Command::Size, "Usage: size <name>"),
            "find" => required(Command::Find, "Usage: find <pattern>"),
            "copy" => {
                let mut parts = arg.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(src), Some(dest), None) => Command::Copy {
                        src: src.to_string(),
                        dest: dest.to_string(),
                    },
                    _ => Command::Usage("Usage: copy <source> <destination>"),
                }
            }
            "write" => match arg.find(char::is_whitespace) {
                Some(i) => Command::Write {
                    path: arg[..i].to_string(),
                    text: arg[i..].trim_start().to_string(),
                },
                None if !arg.is_empty() => Command::Write {
                    path: arg.to_string(),
                    text: String::new(),
                },
                None => Command::Usage("Usage: write <file> <text>"),
            },
            "pwd" => Command::Pwd,
            "format" => Command::Format,
            "fsck" => Command::Fsck,
            "autorun" => parse_autorun(arg),
            "install" => Command::Install,
            "history" => Command::History,
            "clear" | "cls" => Command::Clear,
            "exit" | "quit" => Command::Exit,
            _ => Command::Unknown(word.to_string()),
        }
    }
}

fn parse_autorun(arg: &str) -> Command {
    const USAGE: &str = "Usage: autorun [list | <command> on | <command> off]";

    if arg.is_empty() || arg.eq_ignore_ascii_case("list") {
        return Command::Autorun(AutorunArg::List);
    }
    if arg.eq_ignore_ascii_case("off") {
        return Command::Autorun(AutorunArg::Off);
    }
    let Some((command, switch)) = arg.rsplit_once(char::is_whitespace) else {
        return Command::Usage(USAGE);
    };
    let command = command.trim_end();
    if switch.eq_ignore_ascii_case("on") {
        Command::Autorun(AutorunArg::On(command.to_string()))
    } else if switch.eq_ignore_ascii_case("off") {
        Command::Autorun(AutorunArg::Off)
    } else {
        Command::Usage(USAGE)
    }
}

/// Lines printed by `help`.
pub const HELP: &[&str] = &[
    "Available commands:",
    "  help                     - Show this help",
    "  echo <text>              - Print text",
    "  ls [dir]                 - List directory contents",
    "  cd <dir>                 - Change directory (.. for parent, / for root)",
    "  mkdir <name>             - Create a directory",
    "  touch <name>             - Create an empty file",
    "  rm <name>                - Remove a file or directory",
    "  copy <src> <dest>        - Copy a file",
    "  cat <file>               - Show file contents",
    "  write <file> <text>      - Replace file contents",
    "  size <name>              - Show file or folder size",
    "  find <pattern>           - Find files by name",
    "  pwd                      - Show current directory",
    "  format                   - Erase the filesystem",
    "  fsck                     - Check filesystem integrity",
    "  autorun [list|<cmd> on|<cmd> off] - Boot command",
    "  install                  - Install the system layout",
    "  history                  - Show recent commands",
    "  clear                    - Clear the screen",
    "  exit                     - Leave the shell",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_word_is_case_insensitive() {
        assert_eq!(Command::parse("MKDIR Docs"), Command::Mkdir("Docs".into()));
        assert_eq!(Command::parse("Ls"), Command::Ls(None));
        assert_eq!(Command::parse("PWD"), Command::Pwd);
        assert_eq!(Command::parse("History"), Command::History);
    }

    #[test]
    fn test_argument_is_verbatim() {
        assert_eq!(
            Command::parse("echo   Hello,  World "),
            Command::Echo("Hello,  World".into())
        );
        assert_eq!(
            Command::parse("touch my file.txt"),
            Command::Touch("my file.txt".into())
        );
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(Command::parse("mkdir"), Command::Usage(_)));
        assert!(matches!(Command::parse("cd   "), Command::Usage(_)));
        assert!(matches!(Command::parse("copy a"), Command::Usage(_)));
        assert!(matches!(Command::parse("copy a b c"), Command::Usage(_)));
        assert!(matches!(Command::parse("write"), Command::Usage(_)));
    }

    #[test]
    fn test_copy_and_write() {
        assert_eq!(
            Command::parse("copy a.txt b.txt"),
            Command::Copy {
                src: "a.txt".into(),
                dest: "b.txt".into()
            }
        );
        assert_eq!(
            Command::parse("write notes hello there"),
            Command::Write {
                path: "notes".into(),
                text: "hello there".into()
            }
        );
        assert_eq!(
            Command::parse("write notes"),
            Command::Write {
                path: "notes".into(),
                text: String::new()
            }
        );
    }

    #[test]
    fn test_autorun_forms() {
        assert_eq!(Command::parse("autorun"), Command::Autorun(AutorunArg::List));
        assert_eq!(
            Command::parse("autorun list"),
            Command::Autorun(AutorunArg::List)
        );
        assert_eq!(
            Command::parse("autorun cd home on"),
            Command::Autorun(AutorunArg::On("cd home".into()))
        );
        assert_eq!(
            Command::parse("autorun ls OFF"),
            Command::Autorun(AutorunArg::Off)
        );
        assert_eq!(Command::parse("autorun off"), Command::Autorun(AutorunArg::Off));
        assert!(matches!(Command::parse("autorun ls"), Command::Usage(_)));
        assert!(matches!(Command::parse("autorun on"), Command::Usage(_)));
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("frobnicate x"), Command::Unknown("frobnicate".into()));
    }
}
