use alloc::{borrow::Cow, boxed::Box, vec::Vec};
use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::{
    comms::{sleep, BusyConfig, BusyWait, CommandDataSend},
    error::{ConfigError, Error},
    log::debug,
};

/// One step of a panel's power-on sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub opcode: u8,
    pub params: Cow<'static, [u8]>,
    /// Sleep after the entry has been sent (and waited on, if it busy-waits).
    pub post_delay: Duration,
    /// If set, wait for the busy line to report ready after sending. The name identifies the
    /// wait in a timeout error.
    pub busy_wait: Option<&'static str>,
}

impl CommandEntry {
    pub const fn new(opcode: u8, params: &'static [u8]) -> Self {
        CommandEntry {
            opcode,
            params: Cow::Borrowed(params),
            post_delay: Duration::ZERO,
            busy_wait: None,
        }
    }

    /// An entry with owned parameters, for tables built at runtime.
    pub fn owned(opcode: u8, params: Vec<u8>) -> Self {
        CommandEntry {
            opcode,
            params: Cow::Owned(params),
            post_delay: Duration::ZERO,
            busy_wait: None,
        }
    }

    pub const fn with_delay(mut self, post_delay: Duration) -> Self {
        self.post_delay = post_delay;
        self
    }

    /// Waits for the panel after this entry, reporting a timeout against `stage`.
    pub const fn with_busy_wait(mut self, stage: &'static str) -> Self {
        self.busy_wait = Some(stage);
        self
    }
}

/// An ordered list of [CommandEntry]s, replayed front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitTable(Cow<'static, [CommandEntry]>);

impl InitTable {
    pub const fn from_static(entries: &'static [CommandEntry]) -> Self {
        InitTable(Cow::Borrowed(entries))
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks the table can run on a panel, before anything is sent.
    pub fn validate(&self, has_busy_line: bool) -> Result<(), Error> {
        if has_busy_line {
            return Ok(());
        }
        match self.0.iter().position(|entry| entry.busy_wait.is_some()) {
            Some(i) => Err(ConfigError::MalformedEntry {
                entry: i + 1,
                reason: "busy-wait requested but the panel has no busy line",
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Sends every entry in order: opcode, parameters, busy-wait and post-delay.
    ///
    /// `busy` is `None` for panels without a busy line, in which case the table is rejected up
    /// front if any entry busy-waits. Otherwise stops at the first failure, which is reported as
    /// [Error::InitEntry] with the 1-based position of the failing entry. Nothing is retried.
    pub fn apply<I, D>(
        &self,
        interface: &mut I,
        delay: &mut D,
        busy: Option<&BusyConfig>,
    ) -> Result<(), Error>
    where
        I: CommandDataSend + BusyWait,
        D: DelayNs,
    {
        self.validate(busy.is_some())?;
        debug!("Applying init table of {} entries", self.len());
        for (i, entry) in self.0.iter().enumerate() {
            apply_entry(interface, delay, busy, entry).map_err(|source| Error::InitEntry {
                entry: i + 1,
                opcode: entry.opcode,
                source: Box::new(source),
            })?;
        }
        Ok(())
    }
}

impl From<Vec<CommandEntry>> for InitTable {
    fn from(entries: Vec<CommandEntry>) -> Self {
        InitTable(Cow::Owned(entries))
    }
}

fn apply_entry<I, D>(
    interface: &mut I,
    delay: &mut D,
    busy: Option<&BusyConfig>,
    entry: &CommandEntry,
) -> Result<(), Error>
where
    I: CommandDataSend + BusyWait,
    D: DelayNs,
{
    interface.send(entry.opcode, &entry.params)?;
    if let (Some(busy), Some(stage)) = (busy, entry.busy_wait) {
        interface.wait_ready(delay, busy, stage)?;
    }
    sleep(delay, entry.post_delay);
    Ok(())
}
