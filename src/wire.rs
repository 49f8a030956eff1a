use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::booking::{BookingError, BookingService, NewReservation};
use crate::command::{self, Command, CommandError};
use crate::engine::EngineError;
use crate::lifecycle::{LifecycleScheduler, SchedulerError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::StoreError;

/// Everything a connection needs to serve commands.
pub struct AppContext {
    pub booking: BookingService,
    pub scheduler: Arc<LifecycleScheduler>,
    pub notify: Arc<NotifyHub>,
}

/// Serve one control connection: one JSON request per line, one JSON response per line.
/// After `listen`, status events are interleaved as `{"event": ..}` lines.
pub async fn process_connection(socket: TcpStream, ctx: Arc<AppContext>) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut events: Option<broadcast::Receiver<StatusEvent>> = None;

    loop {
        tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        let reply = error_reply("bad_request", format!("line longer than {MAX_LINE_LEN} bytes"));
                        framed.send(reply).await?;
                        break;
                    }
                    Some(Err(e)) => return Err(e),
                };
                let reply = handle_line(&ctx, &line, &mut events).await;
                framed.send(reply).await?;
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        let line = json!({ "event": EventInfo::from(&event) }).to_string();
                        framed.send(line).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("listener lagged, {n} status events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => events = None,
                }
            }
        }
    }
    Ok(())
}

/// Pending forever while not listening.
async fn next_event(
    rx: &mut Option<broadcast::Receiver<StatusEvent>>,
) -> Result<StatusEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_line(
    ctx: &AppContext,
    line: &str,
    events: &mut Option<broadcast::Receiver<StatusEvent>>,
) -> String {
    let cmd = match command::parse_command(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(crate::observability::REQUESTS_TOTAL, "command" => "unknown", "status" => "error")
                .increment(1);
            return command_reply(e);
        }
    };

    let label = crate::observability::command_label(&cmd);
    debug!("command: {label}");
    let start = Instant::now();
    let result = execute(ctx, cmd, events).await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(crate::observability::REQUESTS_TOTAL, "command" => label, "status" => status)
        .increment(1);
    metrics::histogram!(crate::observability::REQUEST_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(data) => json!({ "ok": true, "data": data }).to_string(),
        Err(reply) => reply,
    }
}

/// Run a command. `Err` carries the already-rendered error line.
async fn execute(
    ctx: &AppContext,
    cmd: Command,
    events: &mut Option<broadcast::Receiver<StatusEvent>>,
) -> Result<serde_json::Value, String> {
    let value = match cmd {
        Command::CheckAvailability {
            space_type,
            start_date,
            end_date,
        } => {
            let answer = ctx
                .booking
                .check_availability(&space_type, start_date, end_date)
                .await
                .map_err(booking_reply)?;
            json!(answer)
        }
        Command::DailyOccupancy {
            space_type,
            start_date,
            end_date,
        } => {
            let days = ctx
                .booking
                .daily_occupancy(&space_type, start_date, end_date)
                .await
                .map_err(booking_reply)?;
            json!(days)
        }
        Command::CreateReservation {
            space_type,
            start_date,
            end_date,
            confirmed,
        } => {
            let r = ctx
                .booking
                .create_reservation(NewReservation {
                    space_type,
                    start_date,
                    end_date,
                    confirmed,
                })
                .await
                .map_err(booking_reply)?;
            json!(ReservationInfo::from(&r))
        }
        Command::Confirm { id } => {
            let r = ctx.booking.confirm(id).await.map_err(booking_reply)?;
            json!(ReservationInfo::from(&r))
        }
        Command::Cancel { id } => {
            let r = ctx.booking.cancel(id).await.map_err(booking_reply)?;
            json!(ReservationInfo::from(&r))
        }
        Command::GetReservation { id } => {
            let r = ctx.booking.get(id).await.map_err(booking_reply)?;
            json!(ReservationInfo::from(&r))
        }
        Command::ListReservations {
            space_type,
            status,
            active_only,
            start_date,
            end_date,
        } => {
            let filter = command::list_filter(space_type, status, active_only, start_date, end_date)
                .map_err(command_reply)?;
            let list = ctx.booking.list(&filter).await.map_err(booking_reply)?;
            json!(list.iter().map(ReservationInfo::from).collect::<Vec<_>>())
        }
        Command::SchedulerStatus => json!(ctx.scheduler.status().await),
        Command::SchedulerConfig => json!(ctx.scheduler.config().await),
        Command::ConfigureScheduler {
            enabled,
            interval_minutes,
            creation_timeout_days,
            expiration_window_hours,
            completion_window_hours,
        } => {
            let requested = command::merge_scheduler_config(
                ctx.scheduler.config().await,
                enabled,
                interval_minutes,
                creation_timeout_days,
                expiration_window_hours,
                completion_window_hours,
            );
            let adjusted = ctx.scheduler.configure(requested).await;
            let messages: Vec<String> = adjusted.iter().map(|n| n.to_string()).collect();
            json!({
                "config": ctx.scheduler.config().await,
                "adjusted": adjusted,
                "messages": messages,
            })
        }
        Command::RunNow => {
            let result = ctx.scheduler.run_once().await.map_err(scheduler_reply)?;
            json!(result)
        }
        Command::StartScheduler => {
            ctx.scheduler.start().await;
            json!(ctx.scheduler.status().await)
        }
        Command::StopScheduler => {
            ctx.scheduler.stop().await;
            json!(ctx.scheduler.status().await)
        }
        Command::Listen { space_type } => match space_type {
            Some(space) => {
                ctx.booking
                    .engine()
                    .capacity(&space)
                    .map_err(|e| booking_reply(e.into()))?;
                *events = Some(ctx.notify.subscribe(&space));
                json!({ "listening": space })
            }
            None => {
                *events = Some(ctx.notify.subscribe_all());
                json!({ "listening": "*" })
            }
        },
        Command::Unlisten => {
            *events = None;
            json!({ "listening": null })
        }
    };
    Ok(value)
}

// ── Error replies ────────────────────────────────────────────────

fn error_reply(kind: &str, message: impl std::fmt::Display) -> String {
    json!({
        "ok": false,
        "error": { "kind": kind, "message": message.to_string() },
    })
    .to_string()
}

fn command_reply(e: CommandError) -> String {
    error_reply("bad_request", e)
}

/// An unavailable range still answers with the full availability record and its alternatives.
fn booking_reply(e: BookingError) -> String {
    match &e {
        BookingError::Unavailable(answer) => json!({
            "ok": false,
            "error": { "kind": "unavailable", "message": e.to_string() },
            "data": answer,
        })
        .to_string(),
        BookingError::Engine(inner) => error_reply(engine_kind(inner), &e),
        BookingError::Store(inner) => error_reply(store_kind(inner), &e),
    }
}

fn scheduler_reply(e: SchedulerError) -> String {
    let kind = match &e {
        SchedulerError::RunInProgress => "run_in_progress",
        SchedulerError::StoreRead(_) => "store_read_failure",
    };
    error_reply(kind, e)
}

fn engine_kind(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidRange { .. } => "invalid_range",
        EngineError::UnknownSpaceType(_) => "unknown_space_type",
        EngineError::LimitExceeded(_) => "limit_exceeded",
    }
}

fn store_kind(e: &StoreError) -> &'static str {
    match e {
        StoreError::ReadFailure(_) => "store_read_failure",
        StoreError::WriteFailure(_) => "store_write_failure",
        StoreError::NotFound(_) => "not_found",
        StoreError::AlreadyExists(_) => "already_exists",
        StoreError::TerminalStatus { .. }
        | StoreError::IllegalTransition { .. }
        | StoreError::StatusMismatch { .. } => "illegal_transition",
        StoreError::InvalidInitialStatus(_) => "invalid_status",
    }
}

/// Status event as written to listeners.
#[derive(Serialize)]
struct EventInfo {
    reservation_id: String,
    space_type: String,
    from: &'static str,
    to: &'static str,
    cancel_reason: Option<&'static str>,
    reason: Option<&'static str>,
    at: DateTime<Utc>,
}

impl From<&StatusEvent> for EventInfo {
    fn from(e: &StatusEvent) -> Self {
        Self {
            reservation_id: e.reservation_id.to_string(),
            space_type: e.space_type.clone(),
            from: e.from.label(),
            to: e.to.label(),
            cancel_reason: e.to.cancel_reason().map(|c| c.as_str()),
            reason: e.reason.map(|r| r.as_str()),
            at: e.at,
        }
    }
}
