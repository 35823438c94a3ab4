//! A fake panel: one event log shared by the line set, the transport and the delay, so tests can
//! assert the exact ordering of line changes, writes and sleeps.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use embedded_hal::{delay::DelayNs, digital::PinState};
use spi_panel::{
    error::{IoError, ResourceError},
    hw::{LineRole, LineSet, Transport},
    Error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Set(LineRole, PinState),
    Get(LineRole, PinState),
    Write(Vec<u8>),
    Delay(Duration),
    Release,
    Close,
}

/// A command as the panel sees it: the opcode written with DC low, then every byte written with DC
/// high until the next opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub data: Vec<u8>,
}

pub fn frame(opcode: u8, data: &[u8]) -> Frame {
    Frame {
        opcode,
        data: data.to_vec(),
    }
}

struct State {
    events: Vec<Event>,
    roles: Vec<LineRole>,
    busy: VecDeque<PinState>,
    busy_idle: PinState,
    fail_writes_after: Option<usize>,
    released: bool,
    closed: bool,
}

/// Cheap to clone; every clone shares the same log.
#[derive(Clone)]
pub struct Recorder {
    state: Rc<RefCell<State>>,
}

impl Recorder {
    /// A recorder holding lines for `roles`. The busy line, if any, reads `busy_idle` once its
    /// script runs out.
    pub fn new(roles: &[LineRole], busy_idle: PinState) -> Self {
        Recorder {
            state: Rc::new(RefCell::new(State {
                events: Vec::new(),
                roles: roles.to_vec(),
                busy: VecDeque::new(),
                busy_idle,
                fail_writes_after: None,
                released: false,
                closed: false,
            })),
        }
    }

    /// DC, reset and an active-high busy line that always reads ready.
    pub fn epaper() -> Self {
        Self::new(
            &[LineRole::DataCommand, LineRole::Reset, LineRole::Busy],
            PinState::Low,
        )
    }

    /// DC, reset and chip select.
    pub fn tft() -> Self {
        Self::new(
            &[LineRole::DataCommand, LineRole::Reset, LineRole::ChipSelect],
            PinState::Low,
        )
    }

    /// Queues levels for the next busy reads.
    pub fn script_busy(&self, levels: impl IntoIterator<Item = PinState>) {
        self.state.borrow_mut().busy.extend(levels);
    }

    pub fn set_busy_idle(&self, level: PinState) {
        self.state.borrow_mut().busy_idle = level;
    }

    /// Lets `count` more writes succeed, then fails every write after.
    pub fn fail_writes_after(&self, count: usize) {
        self.state.borrow_mut().fail_writes_after = Some(count);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    /// Number of busy polls recorded.
    pub fn polls(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Get(LineRole::Busy, _)))
            .count()
    }

    /// Total time slept.
    pub fn slept(&self) -> Duration {
        self.events()
            .iter()
            .filter_map(|event| match event {
                Event::Delay(duration) => Some(*duration),
                _ => None,
            })
            .sum()
    }

    /// Decodes the writes into commands using the DC level at the time of each write.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut dc = PinState::Low;
        for event in self.events() {
            match event {
                Event::Set(LineRole::DataCommand, level) => dc = level,
                Event::Write(bytes) if dc == PinState::Low => {
                    assert_eq!(bytes.len(), 1, "opcodes are written one byte at a time");
                    frames.push(frame(bytes[0], &[]));
                }
                Event::Write(bytes) => frames
                    .last_mut()
                    .expect("data written before any command")
                    .data
                    .extend(bytes),
                _ => {}
            }
        }
        frames
    }

    fn push(&self, event: Event) {
        self.state.borrow_mut().events.push(event);
    }

    fn held(&self, role: LineRole) -> bool {
        let state = self.state.borrow();
        !state.released && state.roles.contains(&role)
    }
}

impl LineSet for Recorder {
    fn set(&mut self, role: LineRole, level: PinState) -> Result<(), Error> {
        if role == LineRole::Busy {
            return Err(ResourceError::WrongDirection(role).into());
        }
        if !self.held(role) {
            return Err(ResourceError::NotAcquired(role).into());
        }
        self.push(Event::Set(role, level));
        Ok(())
    }

    fn get(&mut self, role: LineRole) -> Result<PinState, Error> {
        if role != LineRole::Busy {
            return Err(ResourceError::WrongDirection(role).into());
        }
        if !self.held(role) {
            return Err(ResourceError::NotAcquired(role).into());
        }
        let level = {
            let mut state = self.state.borrow_mut();
            let idle = state.busy_idle;
            state.busy.pop_front().unwrap_or(idle)
        };
        self.push(Event::Get(role, level));
        Ok(level)
    }

    fn has(&self, role: LineRole) -> bool {
        self.held(role)
    }

    fn release(&mut self) {
        self.state.borrow_mut().released = true;
        self.push(Event::Release);
    }
}

impl Transport for Recorder {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(IoError::Closed.into());
            }
            match state.fail_writes_after {
                Some(0) => {
                    return Err(IoError::ShortWrite {
                        expected: bytes.len(),
                        written: 0,
                    }
                    .into())
                }
                Some(ref mut remaining) => *remaining -= 1,
                None => {}
            }
        }
        self.push(Event::Write(bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
        self.push(Event::Close);
    }
}

impl DelayNs for Recorder {
    fn delay_ns(&mut self, ns: u32) {
        self.push(Event::Delay(Duration::from_nanos(ns.into())));
    }

    fn delay_us(&mut self, us: u32) {
        self.push(Event::Delay(Duration::from_micros(us.into())));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.push(Event::Delay(Duration::from_millis(ms.into())));
    }
}
