//! ANSI styling for line-oriented output. Styles are dropped when stdout is
//! not a terminal.

use std::io::IsTerminal;
use std::sync::LazyLock;

static COLOR: LazyLock<bool> = LazyLock::new(|| std::io::stdout().is_terminal());

fn paint(code: &str, text: &str) -> String {
    if *COLOR {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

pub fn bold(text: &str) -> String {
    paint("1", text)
}

pub fn dim(text: &str) -> String {
    paint("2", text)
}

pub fn yellow(text: &str) -> String {
    paint("33", text)
}

pub fn cyan(text: &str) -> String {
    paint("36", text)
}

pub fn bold_red(text: &str) -> String {
    paint("1;31", text)
}

pub fn bold_cyan(text: &str) -> String {
    paint("1;36", text)
}
