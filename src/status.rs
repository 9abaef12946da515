use chrono::{DateTime, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl MessageType {
    pub fn to_str(&self) -> &'static str {
        match self {
            MessageType::Error => "Error",
            MessageType::Warning => "Warning",
            MessageType::Info => "Info",
            MessageType::Debug => "Debug",
            MessageType::Trace => "Trace",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            MessageType::Error => "\x1b[31m",
            MessageType::Warning => "\x1b[33m",
            MessageType::Info => "\x1b[0m",
            MessageType::Debug => "\x1b[90m",
            MessageType::Trace => "\x1b[90m",
        }
    }
}

impl From<Level> for MessageType {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => MessageType::Error,
            Level::Warn => MessageType::Warning,
            Level::Info => MessageType::Info,
            Level::Debug => MessageType::Debug,
            Level::Trace => MessageType::Trace,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StatusMessage {
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub content: String,
}

impl StatusMessage {
    pub fn new(message_type: MessageType, content: String) -> Self {
        StatusMessage {
            timestamp: Utc::now(),
            message_type,
            content,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} | {:^8} | {}\x1b[0m",
            self.message_type.color(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message_type.to_str(),
            self.content,
        )
    }
}

/// Bounded history of status messages, echoed to stderr when `headless`.
pub struct MessageLog {
    messages: Vec<StatusMessage>,
    headless: bool,
    max_size: usize,
}

impl MessageLog {
    pub fn new(headless: bool, max_size: Option<usize>) -> Self {
        MessageLog {
            messages: Vec::new(),
            headless,
            max_size: max_size.unwrap_or(500),
        }
    }

    pub fn add_message(&mut self, message: StatusMessage) {
        if self.max_size == 0 {
            return;
        }
        if self.messages.len() == self.max_size {
            self.messages.remove(0);
        }

        if self.headless {
            eprintln!("{}", message);
        }
        self.messages.push(message);
    }

    pub fn get_all_messages(&self) -> Vec<StatusMessage> {
        self.messages.clone()
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }
}

/// `log` backend that files every record into a [`MessageLog`].
pub struct StatusLogger {
    level: LevelFilter,
    log: Mutex<MessageLog>,
}

impl StatusLogger {
    pub fn new(level: LevelFilter, log: MessageLog) -> Self {
        StatusLogger {
            level,
            log: Mutex::new(log),
        }
    }

    /// Installs a headless logger as the global `log` backend.
    pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(StatusLogger::new(
            level,
            MessageLog::new(true, None),
        )))?;
        log::set_max_level(level);
        Ok(())
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        match self.log.lock() {
            Ok(log) => log.get_all_messages(),
            Err(poisoned) => poisoned.into_inner().get_all_messages(),
        }
    }
}

impl Log for StatusLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = StatusMessage::new(record.level().into(), record.args().to_string());
        match self.log.lock() {
            Ok(mut log) => log.add_message(message),
            Err(poisoned) => poisoned.into_inner().add_message(message),
        }
    }

    fn flush(&self) {}
}

/// Maps `-v` repetitions and `--quiet` onto a level filter.
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
