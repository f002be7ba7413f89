use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum LineKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct DownloadSpinner {
    progress_bar: Option<ProgressBar>,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    if std::io::stdout().is_terminal() && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn print_lines(self, lines: &[(LineKind, String)]) {
        for (kind, line) in lines {
            println!("{}", render_line(self.style, *kind, line));
        }
    }

    pub(crate) fn print_error(self, message: &str) {
        eprintln!("{}", render_line(self.style, LineKind::Error, message));
    }

    pub(crate) fn start_download(self, url: &str) -> DownloadSpinner {
        if self.style == OutputStyle::Plain {
            return DownloadSpinner { progress_bar: None };
        }

        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
            progress_bar.set_style(style.tick_chars(".oO@* "));
        }
        progress_bar.set_message(format!("downloading {url}"));
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        DownloadSpinner {
            progress_bar: Some(progress_bar),
        }
    }
}

impl DownloadSpinner {
    pub(crate) fn finish(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn render_line(style: OutputStyle, kind: LineKind, line: &str) -> String {
    match style {
        OutputStyle::Plain => line.to_string(),
        OutputStyle::Rich => match line_style(kind) {
            Some(line_style) => colorize(line_style, line),
            None => line.to_string(),
        },
    }
}

fn line_style(kind: LineKind) -> Option<Style> {
    match kind {
        LineKind::Info => None,
        LineKind::Success => Some(
            Style::new()
                .fg_color(Some(AnsiColor::BrightGreen.into()))
                .effects(Effects::BOLD),
        ),
        LineKind::Warning => Some(Style::new().fg_color(Some(AnsiColor::Yellow.into()))),
        LineKind::Error => Some(
            Style::new()
                .fg_color(Some(AnsiColor::BrightRed.into()))
                .effects(Effects::BOLD),
        ),
    }
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
