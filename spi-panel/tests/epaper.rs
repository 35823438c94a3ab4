mod common;

use std::time::Duration;

use common::{frame, Event, Recorder};
use embedded_hal::digital::PinState;
use spi_panel::{
    epd2in9,
    error::{ConfigError, ResourceError},
    hw::LineRole,
    Error, ErrorKind, Framebuffer, PanelSession, PowerState,
};

type Session = PanelSession<Recorder, Recorder, Recorder>;

fn open(recorder: &Recorder) -> Session {
    PanelSession::new(
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        epd2in9::config(),
    )
    .unwrap()
}

fn stripes() -> Framebuffer {
    Framebuffer::mono_from_fn(128, 296, |row, _| (row / 16) % 2 == 0).unwrap()
}

#[test]
fn test_start_refresh_sleep_traffic() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);

    epd.start().unwrap();
    assert_eq!(epd.state(), PowerState::Initialized);

    // The reset pulse and the first two init entries, exactly.
    assert_eq!(
        recorder.events()[..13],
        [
            Event::Set(LineRole::Reset, PinState::High),
            Event::Delay(Duration::from_millis(10)),
            Event::Set(LineRole::Reset, PinState::Low),
            Event::Delay(Duration::from_millis(10)),
            Event::Set(LineRole::Reset, PinState::High),
            Event::Delay(Duration::from_millis(120)),
            Event::Set(LineRole::DataCommand, PinState::Low),
            Event::Write(vec![0x06]),
            Event::Set(LineRole::DataCommand, PinState::High),
            Event::Write(vec![0x17, 0x17, 0x17]),
            Event::Set(LineRole::DataCommand, PinState::Low),
            Event::Write(vec![0x04]),
            Event::Get(LineRole::Busy, PinState::Low),
        ]
    );

    let white = Framebuffer::white(128, 296).unwrap();
    let new = stripes();
    epd.refresh(&white, &new).unwrap();
    epd.sleep().unwrap();
    assert_eq!(epd.state(), PowerState::Sleeping);

    assert_eq!(
        recorder.frames(),
        vec![
            frame(0x06, &[0x17, 0x17, 0x17]),
            frame(0x04, &[]),
            frame(0x00, &[0x0F]),
            frame(0x50, &[0xF7]),
            frame(0x30, &[0x3C]),
            frame(0x61, &[0x00, 0x80, 0x01, 0x28]),
            frame(0x82, &[0x12]),
            frame(0x10, white.data()),
            frame(0x13, new.data()),
            frame(0x12, &[]),
            frame(0x02, &[]),
            frame(0x07, &[0xA5]),
        ]
    );
    // One poll each for power on, refresh and power off.
    assert_eq!(recorder.polls(), 3);

    // The refresh is waited on before the panel is powered off. The 0x82 parameter is also 0x12,
    // so look for the last one, written with DC low.
    let events = recorder.events();
    let refresh = events
        .iter()
        .rposition(|e| *e == Event::Write(vec![0x12]))
        .unwrap();
    assert_eq!(
        events[refresh - 1],
        Event::Set(LineRole::DataCommand, PinState::Low)
    );
    assert_eq!(events[refresh + 1], Event::Get(LineRole::Busy, PinState::Low));
    assert_eq!(
        events[refresh + 2],
        Event::Set(LineRole::DataCommand, PinState::Low)
    );
    assert_eq!(events[refresh + 3], Event::Write(vec![0x02]));
}

#[test]
fn test_frames_are_written_in_one_call() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    recorder.clear();

    epd.display(&stripes()).unwrap();
    let writes = recorder.writes();
    assert_eq!(writes.len(), 5);
    assert_eq!(writes[1].len(), 4736);
    assert_eq!(writes[3].len(), 4736);
}

#[test]
fn test_display_uses_previous_frame_as_old_data() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();

    let first = stripes();
    let second = Framebuffer::mono_filled(128, 296, true).unwrap();
    epd.display(&first).unwrap();
    recorder.clear();
    epd.display(&second).unwrap();

    let frames = recorder.frames();
    assert_eq!(frames[0], frame(0x10, first.data()));
    assert_eq!(frames[1], frame(0x13, second.data()));
}

#[test]
fn test_clear_refreshes_white_over_white() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    recorder.clear();

    epd.clear().unwrap();
    let white = vec![0xFF; 4736];
    assert_eq!(
        recorder.frames(),
        vec![frame(0x10, &white), frame(0x13, &white), frame(0x12, &[])]
    );
}

#[test]
fn test_refresh_timeout_leaves_state_refreshing() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    recorder.clear();
    recorder.set_busy_idle(PinState::High);

    let white = Framebuffer::white(128, 296).unwrap();
    let err = epd.refresh(&white, &stripes()).unwrap_err();
    match err {
        Error::Timeout { stage, waited } => {
            assert_eq!(stage, "refresh");
            assert_eq!(waited, Duration::from_secs(10));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(epd.state(), PowerState::Refreshing);
    // Polled at 0ms, 20ms, ..., 10s.
    assert_eq!(recorder.polls(), 501);
    assert_eq!(recorder.slept(), Duration::from_secs(10));
}

#[test]
fn test_operations_check_state_before_traffic() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    let white = Framebuffer::white(128, 296).unwrap();

    let err = epd.refresh(&white, &white).unwrap_err();
    assert!(matches!(
        err,
        Error::State {
            operation: "refresh",
            state: PowerState::Uninitialized
        }
    ));
    assert_eq!(epd.init().unwrap_err().kind(), ErrorKind::State);
    assert_eq!(epd.sleep().unwrap_err().kind(), ErrorKind::State);
    assert!(recorder.events().is_empty());

    epd.start().unwrap();
    assert_eq!(epd.reset().unwrap_err().kind(), ErrorKind::State);
}

#[test]
fn test_refresh_rejects_mismatched_frames() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    recorder.clear();

    let small = Framebuffer::white(64, 296).unwrap();
    let err = epd.display(&small).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::DimensionMismatch { .. })
    ));
    let color = Framebuffer::rgb565_filled(128, 296, 0);
    let err = epd.display(&color).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::EncodingMismatch { .. })
    ));
    assert!(recorder.events().is_empty());
    assert_eq!(epd.state(), PowerState::Initialized);

    let err = epd
        .write_window(spi_panel::RefreshWindow::new(0, 0, 7, 0), &[0; 16])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::UnsupportedOperation("write_window"))
    ));
}

#[test]
fn test_sleep_then_reset_wakes_panel() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    epd.sleep().unwrap();
    assert_eq!(epd.send(0x12, &[]).unwrap_err().kind(), ErrorKind::State);

    epd.start().unwrap();
    assert_eq!(epd.state(), PowerState::Initialized);
}

#[test]
fn test_init_failure_reports_entry() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.reset().unwrap();
    // Entry 1 writes its opcode and parameters, entry 2 its opcode. Entry 3 fails.
    recorder.fail_writes_after(3);

    let err = epd.init().unwrap_err();
    assert!(matches!(
        err,
        Error::InitEntry {
            entry: 3,
            opcode: 0x00,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(epd.state(), PowerState::Reset);
    assert_eq!(recorder.writes().len(), 3);
}

#[test]
fn test_power_on_timeout_names_its_stage() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.reset().unwrap();
    recorder.set_busy_idle(PinState::High);

    match epd.init().unwrap_err() {
        Error::InitEntry {
            entry,
            opcode,
            source,
        } => {
            assert_eq!(entry, 2);
            assert_eq!(opcode, 0x04);
            assert!(matches!(
                *source,
                Error::Timeout {
                    stage: "power on",
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(epd.state(), PowerState::Reset);
}

#[test]
fn test_new_requires_busy_line() {
    let recorder = Recorder::new(&[LineRole::DataCommand, LineRole::Reset], PinState::Low);
    let err = PanelSession::new(
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        epd2in9::config(),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        Error::Resource(ResourceError::NotAcquired(LineRole::Busy))
    ));
    assert!(recorder.is_released());
    assert!(recorder.is_closed());
    assert_eq!(recorder.events(), vec![Event::Release, Event::Close]);
}

#[test]
fn test_release_is_idempotent_and_runs_on_drop() {
    let recorder = Recorder::epaper();
    let mut epd = open(&recorder);
    epd.start().unwrap();
    epd.release();
    epd.release();
    assert!(recorder.is_released());
    assert!(recorder.is_closed());
    assert_eq!(epd.state(), PowerState::Uninitialized);
    assert_eq!(epd.start().unwrap_err().kind(), ErrorKind::Resource);

    let recorder = Recorder::epaper();
    {
        let mut epd = open(&recorder);
        epd.start().unwrap();
    }
    assert!(recorder.is_released());
    assert!(recorder.is_closed());
    assert_eq!(
        recorder.events()[recorder.events().len() - 2..],
        [Event::Release, Event::Close]
    );
}
