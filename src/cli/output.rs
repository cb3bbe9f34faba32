//! Colored terminal output for command results
//!
//! `colored` honors NO_COLOR, CLICOLOR and CLICOLOR_FORCE.

use std::fmt::Display;
use std::path::Path;

use colored::Colorize;

const LABEL_WIDTH: usize = 16;

/// Error line on stderr.
pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "warning".yellow(), msg);
}

/// Closing line of a command, e.g. the total removed.
pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

pub fn section(title: &str) {
    println!("{}", title.cyan().bold());
}

/// One `label value` row under a section, labels padded to a column.
pub fn row(label: &str, value: &(impl Display + ?Sized)) {
    println!("  {} {}", format!("{label:<LABEL_WIDTH$}").green(), value);
}

pub fn written(path: &Path) {
    println!("{} {}", "wrote".green(), path.display());
}

/// Unstyled data such as frame trees and TOML.
pub fn data(content: &(impl Display + ?Sized)) {
    println!("{}", content);
}
