use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{Command, HELP};
use crate::engine::{Engine, EngineError, exit_message};
use crate::limits::COMMAND_CHANNEL_CAPACITY;
use crate::model::*;
use crate::notify::NotifyHub;

/// Result of a command, rendered by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Message(String),
    Status(ParkingStatus),
    Vehicles(Vec<Visit>),
    Report {
        records: Vec<Visit>,
        summary: ReportSummary,
    },
    Valid {
        plate: String,
        valid: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    Engine(EngineError),
    /// `entry`/`exit` without a plate before any plate was recognised.
    NoPendingPlate,
    /// Recognition candidates cannot be injected (no voting channel, or it is full).
    CandidatesUnavailable,
    /// The controller task has stopped.
    Closed,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Engine(e) => write!(f, "{e}"),
            ControlError::NoPendingPlate => write!(f, "no plate given and none recognised"),
            ControlError::CandidatesUnavailable => write!(f, "plate recognition is not accepting candidates"),
            ControlError::Closed => write!(f, "controller stopped"),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<EngineError> for ControlError {
    fn from(e: EngineError) -> Self {
        ControlError::Engine(e)
    }
}

impl ControlError {
    fn status_label(&self) -> &'static str {
        match self {
            ControlError::Engine(e) if !e.is_rejection() => "error",
            ControlError::Closed => "error",
            _ => "rejected",
        }
    }
}

fn write_visit(f: &mut fmt::Formatter<'_>, v: &Visit) -> fmt::Result {
    let exit = v
        .exit_time
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "-".into());
    writeln!(
        f,
        "  {:<12} {}  {}  {:>8.2}",
        v.license_plate,
        format_timestamp(&v.entry_time),
        exit,
        v.fee
    )
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Message(msg) => write!(f, "{msg}"),
            Reply::Status(s) => write!(
                f,
                "total spaces: {}  available: {}  gate: {}",
                s.total_spaces, s.available_spaces, s.gate_status
            ),
            Reply::Vehicles(visits) => {
                writeln!(f, "{} vehicle(s) parked", visits.len())?;
                for v in visits {
                    writeln!(
                        f,
                        "  {:<12} since {}",
                        v.license_plate,
                        format_timestamp(&v.entry_time)
                    )?;
                }
                Ok(())
            }
            Reply::Report { records, summary } => {
                for v in records {
                    write_visit(f, v)?;
                }
                write!(
                    f,
                    "{} visit(s), {} closed, {} open, revenue {:.2}",
                    summary.visits, summary.closed, summary.open, summary.revenue
                )
            }
            Reply::Valid { plate, valid } => {
                let verdict = if *valid { "matches" } else { "does not match" };
                write!(f, "{plate} {verdict} the regional plate format")
            }
        }
    }
}

/// Sole owner of the engine. Every mutation flows through here, one at a time.
pub struct Controller {
    engine: Engine,
    hub: Arc<NotifyHub>,
    /// Input side of the voting window, for operator-injected candidates.
    candidates: Option<mpsc::Sender<String>>,
    /// Latest voting decision not yet consumed by an entry or exit.
    pending_plate: Option<String>,
}

impl Controller {
    pub fn new(engine: Engine, hub: Arc<NotifyHub>) -> Self {
        Self {
            engine,
            hub,
            candidates: None,
            pending_plate: None,
        }
    }

    pub fn with_candidate_sender(mut self, tx: mpsc::Sender<String>) -> Self {
        self.candidates = Some(tx);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn pending_plate(&self) -> Option<&str> {
        self.pending_plate.as_deref()
    }

    /// A voting window closed. The plate waits for the next entry/exit command.
    pub fn on_plate_decided(&mut self, plate: String) {
        info!("plate recognised: {plate}");
        self.pending_plate = Some(plate.clone());
        self.hub.send(GateEvent::PlateDecided { plate });
    }

    fn resolve_plate(&self, plate: Option<String>) -> Result<String, ControlError> {
        plate
            .or_else(|| self.pending_plate.clone())
            .ok_or(ControlError::NoPendingPlate)
    }

    pub fn handle(&mut self, cmd: Command) -> Result<Reply, ControlError> {
        let label = crate::observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.dispatch(cmd);
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.status_label(),
        };
        metrics::counter!(crate::observability::COMMANDS_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(crate::observability::COMMAND_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    fn dispatch(&mut self, cmd: Command) -> Result<Reply, ControlError> {
        match cmd {
            Command::Entry { plate } => {
                let plate = self.resolve_plate(plate)?;
                let at = now();
                let msg = self.engine.process_entry_at(&plate, at)?;
                self.pending_plate = None;
                self.hub.send(GateEvent::VehicleEntered {
                    plate: plate.trim().to_string(),
                    at,
                });
                Ok(Reply::Message(msg))
            }
            Command::Exit { plate } => {
                let plate = self.resolve_plate(plate)?;
                let at = now();
                let visit = self.engine.close_visit_at(&plate, at)?;
                self.pending_plate = None;
                self.hub.send(GateEvent::VehicleExited {
                    plate: visit.license_plate.clone(),
                    at,
                    fee: visit.fee,
                });
                Ok(Reply::Message(exit_message(&visit)))
            }
            Command::Status => Ok(Reply::Status(self.engine.get_status())),
            Command::Current => Ok(Reply::Vehicles(self.engine.get_current_vehicles())),
            Command::Rate { rate } => {
                self.engine.update_rate(rate)?;
                self.hub.send(GateEvent::RateUpdated { hourly_rate: rate });
                Ok(Reply::Message(format!("hourly rate set to {rate:.2}")))
            }
            Command::Records { date } => {
                let records = self.engine.get_records_by_date(date);
                let summary = self.engine.summarize(&records);
                Ok(Reply::Report { records, summary })
            }
            Command::Report { start, end, plate } => {
                let records = self
                    .engine
                    .get_records_by_date_range(start, end, plate.as_deref());
                let summary = self.engine.summarize(&records);
                Ok(Reply::Report { records, summary })
            }
            Command::Validate { plate } => {
                let valid = self.engine.validate_license_plate(&plate);
                Ok(Reply::Valid { plate, valid })
            }
            Command::Gate { status } => {
                self.engine.set_gate_status(status);
                Ok(Reply::Message(format!("gate {status}")))
            }
            Command::Candidate { plate } => {
                let tx = self
                    .candidates
                    .as_ref()
                    .ok_or(ControlError::CandidatesUnavailable)?;
                match tx.try_send(plate) {
                    Ok(()) => Ok(Reply::Message("candidate queued".into())),
                    Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                        Err(ControlError::CandidatesUnavailable)
                    }
                }
            }
            Command::Help => Ok(Reply::Message(HELP.to_string())),
            Command::Quit => Ok(Reply::Message("bye".into())),
        }
    }

    /// Serve requests and plate decisions until the request channel closes.
    /// Returns the engine so callers can inspect final state.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut decisions: mpsc::Receiver<String>,
    ) -> Engine {
        let mut decisions_open = true;
        loop {
            tokio::select! {
                req = requests.recv() => {
                    let Some(req) = req else { break };
                    let result = self.handle(req.command);
                    let _ = req.response.send(result);
                }
                decision = decisions.recv(), if decisions_open => {
                    match decision {
                        Some(plate) => self.on_plate_decided(plate),
                        None => {
                            debug!("voting channel closed");
                            decisions_open = false;
                        }
                    }
                }
            }
        }
        info!("controller stopped");
        self.engine
    }
}

pub struct Request {
    pub command: Command,
    pub response: oneshot::Sender<Result<Reply, ControlError>>,
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Request>,
}

impl ControlHandle {
    pub async fn execute(&self, command: Command) -> Result<Reply, ControlError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(Request { command, response })
            .await
            .map_err(|_| ControlError::Closed)?;
        rx.await.map_err(|_| ControlError::Closed)?
    }
}

/// Start the controller task. It stops once every handle is dropped.
pub fn spawn(
    controller: Controller,
    decisions: mpsc::Receiver<String>,
) -> (ControlHandle, JoinHandle<Engine>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(controller.run(rx, decisions));
    (ControlHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ConfigStore};
    use crate::retry::RetryPolicy;
    use std::path::PathBuf;

    fn test_controller(name: &str, total_spaces: u32) -> (Controller, PathBuf) {
        let dir = std::env::temp_dir().join("parklot_test_controller").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        let mut file = ConfigFile::default();
        file.parking_lot.total_spaces = total_spaces;
        let config =
            ConfigStore::with_file(dir.join("config.json"), file).with_data_dir(dir.join("data"));
        config.save().unwrap();
        let engine = Engine::open(config)
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        (Controller::new(engine, Arc::new(NotifyHub::new())), dir)
    }

    #[test]
    fn entry_without_plate_needs_decision() {
        let (mut ctl, _dir) = test_controller("no_pending", 2);
        assert_eq!(
            ctl.handle(Command::Entry { plate: None }),
            Err(ControlError::NoPendingPlate)
        );
    }

    #[test]
    fn decided_plate_used_and_cleared_on_success() {
        let (mut ctl, _dir) = test_controller("pending_used", 2);
        ctl.on_plate_decided("京A12345".into());
        assert_eq!(ctl.pending_plate(), Some("京A12345"));

        let reply = ctl.handle(Command::Entry { plate: None }).unwrap();
        assert!(reply.to_string().contains("京A12345"));
        assert_eq!(ctl.pending_plate(), None);
        assert!(ctl.engine().is_parked("京A12345"));
    }

    #[test]
    fn decided_plate_kept_on_rejection() {
        let (mut ctl, _dir) = test_controller("pending_kept", 2);
        ctl.on_plate_decided("B1".into());
        let err = ctl.handle(Command::Exit { plate: None }).unwrap_err();
        assert_eq!(err, ControlError::Engine(EngineError::NoOpenVisit("B1".into())));
        assert_eq!(ctl.pending_plate(), Some("B1"));
    }

    #[test]
    fn exit_publishes_fee() {
        let (mut ctl, _dir) = test_controller("exit_event", 2);
        let mut events = ctl.hub.subscribe();
        ctl.handle(Command::Entry {
            plate: Some("C1".into()),
        })
        .unwrap();
        ctl.handle(Command::Exit {
            plate: Some("C1".into()),
        })
        .unwrap();

        assert!(matches!(events.try_recv().unwrap(), GateEvent::VehicleEntered { .. }));
        match events.try_recv().unwrap() {
            GateEvent::VehicleExited { plate, fee, .. } => {
                assert_eq!(plate, "C1");
                assert_eq!(fee, 5.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn status_and_report_replies() {
        let (mut ctl, _dir) = test_controller("replies", 3);
        ctl.handle(Command::Entry {
            plate: Some("D1".into()),
        })
        .unwrap();

        let reply = ctl.handle(Command::Status).unwrap();
        assert_eq!(
            reply,
            Reply::Status(ParkingStatus {
                total_spaces: 3,
                available_spaces: 2,
                gate_status: GateStatus::Closed,
            })
        );
        assert_eq!(reply.to_string(), "total spaces: 3  available: 2  gate: closed");

        let today = now().date();
        match ctl.handle(Command::Records { date: today }).unwrap() {
            Reply::Report { records, summary } => {
                assert_eq!(records.len(), 1);
                assert_eq!(summary.open, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn validate_reply() {
        let (mut ctl, _dir) = test_controller("validate", 1);
        let reply = ctl
            .handle(Command::Validate {
                plate: "ABC".into(),
            })
            .unwrap();
        assert_eq!(
            reply,
            Reply::Valid {
                plate: "ABC".into(),
                valid: false
            }
        );
    }

    #[test]
    fn candidate_without_channel_unavailable() {
        let (mut ctl, _dir) = test_controller("no_channel", 1);
        assert_eq!(
            ctl.handle(Command::Candidate { plate: "A".into() }),
            Err(ControlError::CandidatesUnavailable)
        );
    }

    #[tokio::test]
    async fn spawned_controller_serves_handles() {
        let (ctl, _dir) = test_controller("spawned", 1);
        let (_dec_tx, dec_rx) = mpsc::channel(1);
        let (handle, task) = spawn(ctl, dec_rx);

        handle
            .execute(Command::Entry {
                plate: Some("E1".into()),
            })
            .await
            .unwrap();
        let err = handle
            .execute(Command::Entry {
                plate: Some("E2".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ControlError::Engine(EngineError::LotFull));

        drop(handle);
        let engine = task.await.unwrap();
        assert_eq!(engine.available_spaces(), 0);
    }
}
