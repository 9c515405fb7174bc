use std::fmt::Display;
use std::io::{self, Write};

use anyhow::bail;
use is_terminal::IsTerminal;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn to_choice(self, stream_is_tty: bool) -> ColorChoice {
        match self {
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
            ColorMode::Auto if stream_is_tty => ColorChoice::Auto,
            ColorMode::Auto => ColorChoice::Never,
        }
    }
}

/// Cargo-style status output, written to stderr.
pub struct Shell {
    err: StandardStream,
    verbosity: Verbosity,
}

impl Shell {
    pub fn new() -> Self {
        let color = ColorMode::Auto;
        Self {
            err: StandardStream::stderr(color.to_choice(io::stderr().is_terminal())),
            verbosity: Verbosity::Normal,
        }
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    /// Accepts the same values as cargo's `--color`.
    pub fn set_color_choice(&mut self, color: Option<&str>) -> anyhow::Result<()> {
        let color = match color {
            Some("always") => ColorMode::Always,
            Some("never") => ColorMode::Never,
            Some("auto") | None => ColorMode::Auto,
            Some(other) => bail!(
                "argument for --color must be auto, always, or never, but found `{other}`"
            ),
        };
        self.err = StandardStream::stderr(color.to_choice(io::stderr().is_terminal()));
        Ok(())
    }

    /// Runs `callback` only at `-v` or above.
    pub fn verbose<F>(&mut self, mut callback: F) -> io::Result<()>
    where
        F: FnMut(&mut Shell) -> io::Result<()>,
    {
        if self.verbosity >= Verbosity::Verbose {
            callback(self)
        } else {
            Ok(())
        }
    }

    /// Runs `callback` only at `-vv`.
    pub fn very_verbose<F>(&mut self, mut callback: F) -> io::Result<()>
    where
        F: FnMut(&mut Shell) -> io::Result<()>,
    {
        if self.verbosity >= Verbosity::VeryVerbose {
            callback(self)
        } else {
            Ok(())
        }
    }

    fn print(
        &mut self,
        header: &dyn Display,
        message: &dyn Display,
        color: Color,
        justified: bool,
    ) -> io::Result<()> {
        self.err.reset()?;
        self.err
            .set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))?;
        if justified {
            write!(self.err, "{header:>12}")?;
        } else {
            write!(self.err, "{header}")?;
            self.err.set_color(ColorSpec::new().set_bold(true))?;
            write!(self.err, ":")?;
        }
        self.err.reset()?;
        writeln!(self.err, " {message}")
    }

    pub fn status<T: Display, U: Display>(&mut self, status: T, message: U) -> io::Result<()> {
        self.status_with_color(status, message, Color::Green)
    }

    pub fn status_with_color<T: Display, U: Display>(
        &mut self,
        status: T,
        message: U,
        color: Color,
    ) -> io::Result<()> {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        self.print(&status, &message, color, true)
    }

    /// Errors are printed regardless of verbosity.
    pub fn error<T: Display>(&mut self, message: T) -> io::Result<()> {
        self.print(&"error", &message, Color::Red, false)
    }

    pub fn warn<T: Display>(&mut self, message: T) -> io::Result<()> {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        self.print(&"warning", &message, Color::Yellow, false)
    }

    pub fn note<T: Display>(&mut self, message: T) -> io::Result<()> {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        self.print(&"note", &message, Color::Cyan, false)
    }
}
