//! The two SGR paints the store's text conventions use. Stored text keeps
//! the escape codes intact; the renderer decides whether to convert or
//! strip them.

pub const RED: &str = "\x1b[31m";
pub const WHITE: &str = "\x1b[37m";
pub const RESET: &str = "\x1b[0m";

pub fn red(text: &str) -> String {
    format!("{RED}{text}{RESET}")
}

pub fn white(text: &str) -> String {
    format!("{WHITE}{text}{RESET}")
}
