//! Command sequencer - runs user operations in order against one device.
//!
//! Every operation is preceded by a GET_CPU_INFO liveness probe. The first
//! failure aborts the rest of the list; the only advisory condition is a
//! readback mismatch after a `write`, which is reported and skipped past.

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::device::Cc1800Device;
use crate::error::{BootError, Result};
use crate::events::{BootEvent, BootObserver, TracingObserver};
use crate::ops::{self, Mismatch, find_mismatch};
use crate::protocol::CpuInfo;
use crate::transport::UsbTransport;

/// One user-issued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Upload `data` to `address` and read it back for comparison.
    Write { address: u32, data: Vec<u8> },
    /// Download `length` bytes from `address`.
    Read { address: u32, length: u32 },
    /// Execute at the last set address.
    Exec,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Write { address, data } => {
                write!(f, "write 0x{:08X} ({} bytes)", address, data.len())
            }
            Operation::Read { address, length } => {
                write!(f, "read 0x{:08X} ({} bytes)", address, length)
            }
            Operation::Exec => write!(f, "exec"),
        }
    }
}

/// Sequencer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    #[default]
    Start,
    /// Probing before operation N.
    Probing(usize),
    ProbeFailed(usize),
    /// Running operation N.
    Dispatching(usize),
    /// Operation N failed; nothing after it runs.
    Aborted(usize),
    Done,
}

impl SequencerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SequencerState::ProbeFailed(_) | SequencerState::Aborted(_) | SequencerState::Done
        )
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Start => write!(f, "START"),
            SequencerState::Probing(i) => write!(f, "PROBING[{}]", i),
            SequencerState::ProbeFailed(i) => write!(f, "PROBE_FAILED[{}]", i),
            SequencerState::Dispatching(i) => write!(f, "DISPATCHING[{}]", i),
            SequencerState::Aborted(i) => write!(f, "ABORTED[{}]", i),
            SequencerState::Done => write!(f, "DONE"),
        }
    }
}

/// Receives the bytes of each `read` as soon as they are downloaded.
pub trait ReadSink {
    /// `index` is the position of the operation in the list.
    fn persist(&mut self, index: usize, address: u32, data: Vec<u8>) -> io::Result<()>;
}

impl<F> ReadSink for F
where
    F: FnMut(usize, u32, Vec<u8>) -> io::Result<()>,
{
    fn persist(&mut self, index: usize, address: u32, data: Vec<u8>) -> io::Result<()> {
        self(index, address, data)
    }
}

/// Summary of a completed sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    /// CPU info from the first probe.
    pub cpu_info: Option<CpuInfo>,
    pub completed: usize,
    pub bytes_written: usize,
    pub bytes_read: usize,
    pub executed: usize,
    /// Advisory write mismatches, by operation index.
    pub mismatches: Vec<(usize, Mismatch)>,
}

impl SequenceReport {
    pub fn verified_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Per-run bookkeeping.
struct RunContext<'o, O: BootObserver> {
    observer: &'o O,
    state: SequencerState,
    report: SequenceReport,
}

impl<O: BootObserver> RunContext<'_, O> {
    fn emit(&self, event: BootEvent) {
        self.observer.on_event(&event);
    }

    fn goto_state(&mut self, to: SequencerState) {
        debug_assert!(!self.state.is_terminal(), "transition out of {}", self.state);
        tracing::debug!(from = %self.state, to = %to, "State transition");
        self.emit(BootEvent::StateChanged {
            from: self.state,
            to,
        });
        self.state = to;
    }

    fn abort(&mut self, state: SequencerState, err: BootError) -> BootError {
        self.goto_state(state);
        self.emit(BootEvent::Error {
            message: err.to_string(),
        });
        err
    }
}

/// Runs operation lists against a device session.
pub struct CommandSequencer<O: BootObserver> {
    observer: Arc<O>,
}

impl CommandSequencer<TracingObserver> {
    /// Create a sequencer with the default tracing observer.
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }
}

impl Default for CommandSequencer<TracingObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: BootObserver> CommandSequencer<O> {
    /// Create a sequencer with a custom observer.
    pub fn with_observer(observer: Arc<O>) -> Self {
        Self { observer }
    }

    /// Run `operations` in order, stopping at the first failure.
    ///
    /// Operations completed before a failure are not undone.
    #[instrument(skip_all, fields(operations = operations.len()))]
    pub fn run<T: UsbTransport, S: ReadSink + ?Sized>(
        &self,
        device: &mut Cc1800Device<'_, T>,
        operations: &[Operation],
        sink: &mut S,
    ) -> Result<SequenceReport> {
        let mut ctx = RunContext {
            observer: self.observer.as_ref(),
            state: SequencerState::Start,
            report: SequenceReport::default(),
        };

        for (index, op) in operations.iter().enumerate() {
            ctx.goto_state(SequencerState::Probing(index));
            let cpu_info = match device.cpu_info() {
                Ok(info) => info,
                Err(BootError::Transport(source)) => {
                    let err = BootError::DeviceUnresponsive { index, source };
                    return Err(ctx.abort(SequencerState::ProbeFailed(index), err));
                }
                Err(e) => return Err(ctx.abort(SequencerState::ProbeFailed(index), e)),
            };

            if ctx.report.cpu_info.is_none() {
                ctx.emit(BootEvent::DeviceConnected {
                    vid: device.transport().vendor_id(),
                    pid: device.transport().product_id(),
                });
                ctx.emit(BootEvent::CpuInfo {
                    info: cpu_info.to_string(),
                });
                ctx.report.cpu_info = Some(cpu_info);
            }

            ctx.goto_state(SequencerState::Dispatching(index));
            ctx.emit(BootEvent::OperationStarted {
                index,
                total: operations.len(),
                operation: op.to_string(),
            });

            if let Err(e) = Self::dispatch(&mut ctx, device, index, op, sink) {
                return Err(ctx.abort(SequencerState::Aborted(index), e));
            }
            ctx.report.completed += 1;
        }

        ctx.goto_state(SequencerState::Done);
        ctx.emit(BootEvent::Complete);
        info!(completed = ctx.report.completed, "Sequence complete");
        Ok(ctx.report)
    }

    fn dispatch<T: UsbTransport, S: ReadSink + ?Sized>(
        ctx: &mut RunContext<'_, O>,
        device: &mut Cc1800Device<'_, T>,
        index: usize,
        op: &Operation,
        sink: &mut S,
    ) -> Result<()> {
        match op {
            Operation::Write { address, data } => {
                let address = *address;
                let written = ops::upload(device, data, address)?;
                ctx.report.bytes_written += written;
                ctx.emit(BootEvent::Uploaded {
                    address,
                    bytes: written,
                });

                let readback = ops::download(device, address, written as u32)?;
                match find_mismatch(data, &readback) {
                    None => ctx.emit(BootEvent::Verified {
                        address,
                        bytes: readback.len(),
                    }),
                    Some(m) => {
                        warn!(index, offset = m.offset, count = m.count, "Data mismatch");
                        ctx.emit(BootEvent::VerifyMismatch {
                            address,
                            offset: m.offset,
                            expected: m.expected,
                            actual: m.actual,
                            count: m.count,
                        });
                        ctx.report.mismatches.push((index, m));
                    }
                }
            }
            Operation::Read { address, length } => {
                let data = ops::download(device, *address, *length)?;
                ctx.report.bytes_read += data.len();
                ctx.emit(BootEvent::Downloaded {
                    address: *address,
                    bytes: data.len(),
                });
                sink.persist(index, *address, data)?;
            }
            Operation::Exec => {
                let address = device.execute()?;
                ctx.report.executed += 1;
                ctx.emit(BootEvent::Executed { address });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BULK_IN_ADDRESS, BULK_OUT_ADDRESS, Direction, SetupPacket};
    use crate::transport::{MockCall, MockTransport, TransportError};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<BootEvent>>);

    impl Recorder {
        fn events(&self) -> Vec<BootEvent> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&BootEvent) -> bool) -> usize {
            self.events().iter().filter(|e| pred(e)).count()
        }
    }

    impl BootObserver for Recorder {
        fn on_event(&self, event: &BootEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn no_reads(_: usize, _: u32, _: Vec<u8>) -> io::Result<()> {
        panic!("unexpected read");
    }

    fn run_with(
        mock: &MockTransport,
        ops: &[Operation],
    ) -> (Result<SequenceReport>, Arc<Recorder>, Vec<(usize, u32, Vec<u8>)>) {
        let recorder = Arc::new(Recorder::default());
        let sequencer = CommandSequencer::with_observer(recorder.clone());
        let mut dev = Cc1800Device::new(mock);
        let mut reads = Vec::new();
        let mut sink = |i: usize, a: u32, d: Vec<u8>| -> io::Result<()> {
            reads.push((i, a, d));
            Ok(())
        };
        let result = sequencer.run(&mut dev, ops, &mut sink);
        (result, recorder, reads)
    }

    #[test]
    fn test_write_then_exec_request_trace() {
        let mock = MockTransport::new();
        let ops = [
            Operation::Write {
                address: 0x1000,
                data: vec![0xAA; 16],
            },
            Operation::Exec,
        ];
        let (result, _, _) = run_with(&mock, &ops);
        let report = result.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                MockCall::ControlIn(SetupPacket::get_cpu_info()),
                MockCall::ControlOut(SetupPacket::set_address(0x1000)),
                MockCall::ControlOut(SetupPacket::set_length(0x8000_0010)),
                MockCall::BulkWrite {
                    endpoint: BULK_OUT_ADDRESS,
                    len: 16
                },
                MockCall::ControlOut(SetupPacket::set_address(0x1000)),
                MockCall::ControlOut(SetupPacket::set_length(0x0000_0010)),
                MockCall::BulkRead {
                    endpoint: BULK_IN_ADDRESS,
                    len: 16
                },
                MockCall::ControlIn(SetupPacket::get_cpu_info()),
                MockCall::ControlOut(SetupPacket::execute()),
            ]
        );
        assert_eq!(mock.executed(), vec![0x1000]);
        assert_eq!(report.completed, 2);
        assert_eq!(report.bytes_written, 16);
        assert_eq!(report.executed, 1);
        assert!(report.verified_clean());
    }

    #[test]
    fn test_short_transfer_aborts_remaining() {
        let mock = MockTransport::new();
        mock.short_bulk_write(8);
        let ops = [
            Operation::Write {
                address: 0x1000,
                data: vec![0x11; 16],
            },
            Operation::Exec,
        ];
        let (result, recorder, _) = run_with(&mock, &ops);
        assert!(matches!(
            result,
            Err(BootError::ShortTransfer {
                expected: 16,
                actual: 8,
                ..
            })
        ));
        assert!(mock.executed().is_empty());
        assert_eq!(
            recorder.count(|e| matches!(e, BootEvent::StateChanged {
                to: SequencerState::Aborted(0),
                ..
            })),
            1
        );
    }

    #[test]
    fn test_short_read_aborts_remaining() {
        let mock = MockTransport::new();
        mock.short_bulk_read(2);
        let ops = [
            Operation::Read {
                address: 0,
                length: 4,
            },
            Operation::Exec,
        ];
        let (result, _, reads) = run_with(&mock, &ops);
        assert!(matches!(
            result,
            Err(BootError::ShortTransfer {
                direction: Direction::Read,
                expected: 4,
                actual: 2,
                ..
            })
        ));
        assert!(reads.is_empty());
        assert!(mock.executed().is_empty());
    }

    #[test]
    fn test_custom_timeout_reaches_transport() {
        let mock = MockTransport::new();
        mock.fail_cpu_info_after(0);
        let sequencer = CommandSequencer::with_observer(Arc::new(Recorder::default()));
        let mut dev = Cc1800Device::new(&mock).with_timeout(Duration::from_millis(250));
        let result = sequencer.run(&mut dev, &[Operation::Exec], &mut no_reads);
        match result {
            Err(BootError::DeviceUnresponsive { index: 0, source }) => {
                assert!(matches!(source, TransportError::Timeout { timeout_ms: 250 }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_mismatch_on_write_is_advisory() {
        let mock = MockTransport::new();
        mock.corrupt_readback(3);
        let ops = [
            Operation::Write {
                address: 0x2000,
                data: vec![0x42; 8],
            },
            Operation::Exec,
        ];
        let (result, recorder, _) = run_with(&mock, &ops);
        let report = result.unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].0, 0);
        assert_eq!(report.mismatches[0].1.offset, 3);
        assert_eq!(mock.executed(), vec![0x2000]);
        assert_eq!(
            recorder.count(|e| matches!(e, BootEvent::VerifyMismatch { offset: 3, .. })),
            1
        );
        assert_eq!(recorder.count(|e| matches!(e, BootEvent::Complete)), 1);
    }

    #[test]
    fn test_probe_failure_before_second_operation() {
        let mock = MockTransport::new();
        mock.fail_cpu_info_after(1);
        let ops = [
            Operation::Write {
                address: 0x1000,
                data: vec![1, 2, 3, 4],
            },
            Operation::Read {
                address: 0x1000,
                length: 4,
            },
        ];
        let (result, _, reads) = run_with(&mock, &ops);
        match result {
            Err(BootError::DeviceUnresponsive { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(source, TransportError::Timeout { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(reads.is_empty());
        // Nothing issued after the failed probe
        assert_eq!(
            mock.calls().last(),
            Some(&MockCall::ControlIn(SetupPacket::get_cpu_info()))
        );
    }

    #[test]
    fn test_probe_failure_before_first_operation() {
        let mock = MockTransport::new();
        mock.fail_cpu_info_after(0);
        let (result, recorder, _) = run_with(&mock, &[Operation::Exec]);
        assert!(matches!(
            result,
            Err(BootError::DeviceUnresponsive { index: 0, .. })
        ));
        assert_eq!(
            mock.calls(),
            vec![MockCall::ControlIn(SetupPacket::get_cpu_info())]
        );
        assert!(mock.executed().is_empty());
        assert_eq!(
            recorder.count(|e| matches!(e, BootEvent::DeviceConnected { .. })),
            0
        );
    }

    #[test]
    fn test_cpu_info_reported_once() {
        let mock = MockTransport::new();
        mock.set_cpu_info(*b"CC1800A\0");
        let ops = [Operation::Exec, Operation::Exec, Operation::Exec];
        let (result, recorder, _) = run_with(&mock, &ops);
        let report = result.unwrap();

        assert_eq!(report.cpu_info.unwrap().to_string(), "CC1800A");
        assert_eq!(
            recorder.count(|e| matches!(e, BootEvent::CpuInfo { .. })),
            1
        );
        assert_eq!(
            recorder.count(|e| matches!(e, BootEvent::DeviceConnected { .. })),
            1
        );
        let probes = mock
            .calls()
            .iter()
            .filter(|c| **c == MockCall::ControlIn(SetupPacket::get_cpu_info()))
            .count();
        assert_eq!(probes, 3);
    }

    #[test]
    fn test_read_hands_buffer_to_sink() {
        let mock = MockTransport::new();
        mock.poke(0x3000, b"bootrom!");
        let ops = [
            Operation::Exec,
            Operation::Read {
                address: 0x3000,
                length: 8,
            },
        ];
        let (result, _, reads) = run_with(&mock, &ops);
        assert_eq!(result.unwrap().bytes_read, 8);
        assert_eq!(reads, vec![(1, 0x3000, b"bootrom!".to_vec())]);
    }

    #[test]
    fn test_sink_error_aborts() {
        let mock = MockTransport::new();
        let sequencer = CommandSequencer::with_observer(Arc::new(Recorder::default()));
        let mut dev = Cc1800Device::new(&mock);
        let mut sink = |_: usize, _: u32, _: Vec<u8>| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        };
        let ops = [
            Operation::Read {
                address: 0,
                length: 4,
            },
            Operation::Exec,
        ];
        let result = sequencer.run(&mut dev, &ops, &mut sink);
        assert!(matches!(result, Err(BootError::Io(_))));
        assert!(mock.executed().is_empty());
    }

    #[test]
    fn test_zero_length_read_rejected() {
        let mock = MockTransport::new();
        let sequencer = CommandSequencer::with_observer(Arc::new(Recorder::default()));
        let mut dev = Cc1800Device::new(&mock);
        let ops = [Operation::Read {
            address: 0x1000,
            length: 0,
        }];
        let result = sequencer.run(&mut dev, &ops, &mut no_reads);
        assert!(matches!(result, Err(BootError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_sequence_is_done() {
        let mock = MockTransport::new();
        let (result, recorder, _) = run_with(&mock, &[]);
        assert_eq!(result.unwrap().completed, 0);
        assert!(mock.calls().is_empty());
        assert_eq!(
            recorder.events().last(),
            Some(&BootEvent::Complete)
        );
    }

    #[test]
    fn test_run_ends_in_terminal_state() {
        let mock = MockTransport::new();
        let (_, recorder, _) = run_with(&mock, &[Operation::Exec]);
        let states: Vec<SequencerState> = recorder
            .events()
            .iter()
            .filter_map(|e| match e {
                BootEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
        assert_eq!(states.last(), Some(&SequencerState::Done));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SequencerState::Probing(2).to_string(), "PROBING[2]");
        assert!(SequencerState::Done.is_terminal());
        assert!(!SequencerState::Dispatching(0).is_terminal());
    }
}
