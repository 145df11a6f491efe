use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{command_label, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};

/// One request per line, tagged by `op`.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CommitReservation {
        token: String,
        court_id: u32,
        start: String,
        #[serde(default)]
        match_id: Option<Ulid>,
    },
    GetOccupancy {
        token: String,
        #[serde(default)]
        date: Option<String>,
    },
    ChangeSlotDuration {
        token: String,
        minutes: i64,
    },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Reservation(Reservation),
    Occupancy(OccupancyReport),
    SlotDuration { slot_duration_minutes: i64 },
    Pong(&'static str),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn success(data: Reply) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(code: &'static str, message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody { code, message }),
        }
    }
}

async fn dispatch(engine: &Engine, req: Request) -> Result<Reply, EngineError> {
    match req {
        Request::CommitReservation {
            token,
            court_id,
            start,
            match_id,
        } => {
            let identity = Identity::new(token);
            let court_id = CourtId(court_id);
            let reservation = match match_id {
                Some(m) => {
                    engine
                        .commit_match_reservation(&identity, court_id, &start, m)
                        .await?
                }
                None => engine.commit_reservation(&identity, court_id, &start).await?,
            };
            Ok(Reply::Reservation(reservation))
        }
        Request::GetOccupancy { token, date } => {
            let report = engine
                .get_occupancy(&Identity::new(token), date.as_deref())
                .await?;
            Ok(Reply::Occupancy(report))
        }
        Request::ChangeSlotDuration { token, minutes } => {
            engine
                .change_slot_duration(&Identity::new(token), minutes)
                .await?;
            Ok(Reply::SlotDuration {
                slot_duration_minutes: minutes,
            })
        }
        Request::Ping => Ok(Reply::Pong("pong")),
    }
}

/// Decode one request line, run it, and build the response.
pub async fn respond(engine: &Engine, line: &str) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "command" => "unknown", "status" => "error")
                .increment(1);
            return Response::failure("invalid_input", format!("malformed request: {e}"));
        }
    };

    let command = command_label(&req);
    let started = Instant::now();
    let result = dispatch(engine, req).await;
    metrics::histogram!(REQUEST_DURATION_SECONDS, "command" => command)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(reply) => {
            metrics::counter!(REQUESTS_TOTAL, "command" => command, "status" => "ok").increment(1);
            Response::success(reply)
        }
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "command" => command, "status" => "error")
                .increment(1);
            Response::failure(e.code(), e.to_string())
        }
    }
}

/// Serve one client until it disconnects. Malformed lines get an error
/// response; only transport failures end the connection early.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => respond(&engine, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => Response::failure(
                "limit_exceeded",
                format!("request line longer than {MAX_LINE_LEN} bytes"),
            ),
            Err(e) => return Err(e),
        };
        let encoded = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"error":{{"code":"internal","message":"encode failed: {e}"}}}}"#)
        });
        framed.send(encoded).await?;
    }
    Ok(())
}
