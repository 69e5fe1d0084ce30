//! Logging setup: colored, level-prefixed, line-wrapped output driven by
//! `env_logger`.

use env_logger::{fmt::Color, Builder};
use log::{Level, LevelFilter};
use std::io::Write;
use std::{env, str::FromStr};

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Sets up the global logger. Safe to call more than once per process.
pub fn set_up_logging() {
    Builder::new()
        .filter_level(
            LevelFilter::from_str(&env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()))
                .unwrap_or(DEFAULT_LOG_LEVEL),
        )
        .format(|buf, record| {
            let mut style = buf.style();
            style.set_bold(true);
            match record.level() {
                Level::Error => {
                    style.set_color(Color::Red);
                }
                Level::Warn => {
                    style.set_color(Color::Yellow);
                }
                Level::Info => {
                    style.set_color(Color::Green);
                }
                Level::Debug | Level::Trace => {
                    style.set_color(Color::Blue);
                }
            }
            let indent_size = record.level().to_string().len() + 3;
            let indent = &" ".repeat(indent_size);
            let options = textwrap::Options::with_termwidth()
                .initial_indent(indent)
                .subsequent_indent(indent);
            writeln!(
                buf,
                "{} {}",
                style.value(format!("[{}]", record.level())),
                &textwrap::fill(&record.args().to_string(), &options)[indent_size..],
            )
        })
        .try_init()
        .ok();
}
