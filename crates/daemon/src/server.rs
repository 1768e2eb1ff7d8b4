// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use wfm_core::EventPattern;
use wfm_daemon::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use wfm_engine::{EngineError, ErrorKind};

use crate::lifecycle::DaemonEngine;

/// What each connection task needs; cheap to clone
#[derive(Clone)]
pub struct ServerContext {
    pub engine: DaemonEngine,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
}

/// Handle a single client connection
pub async fn handle_connection(ctx: ServerContext, stream: UnixStream) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);

    if let Request::Subscribe { patterns } = request {
        return stream_events(&ctx, patterns, reader, writer).await;
    }

    let response = handle_request(&ctx, request).await;

    debug!("Sending response: {:?}", response);

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Forward matching events until the client hangs up
async fn stream_events(
    ctx: &ServerContext,
    patterns: Vec<EventPattern>,
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
) -> Result<(), ServerError> {
    let mut subscriber = ctx.engine.subscribe(patterns);
    protocol::write_response(&mut writer, &Response::Subscribed, DEFAULT_TIMEOUT).await?;

    let mut probe = [0u8; 1];
    loop {
        tokio::select! {
            event = subscriber.recv() => {
                let Some(event) = event else {
                    break;
                };
                let response = Response::Notification { event };
                if let Err(e) = protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await {
                    debug!("Subscriber went away: {}", e);
                    break;
                }
            }
            // Nothing is sent after the request, so any read result is EOF or a broken peer
            _ = reader.read(&mut probe) => {
                debug!("Subscriber disconnected");
                break;
            }
        }
    }

    if subscriber.missed() > 0 {
        warn!(missed = subscriber.missed(), "subscriber fell behind and lost events");
    }
    Ok(())
}

fn error_response(e: EngineError) -> Response {
    Response::error(e.kind(), e.to_string())
}

/// Lift an engine result into a response
fn reply<T>(result: Result<T, EngineError>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => error_response(e),
    }
}

/// Handle a single request and return a response
async fn handle_request(ctx: &ServerContext, request: Request) -> Response {
    let engine = &ctx.engine;

    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Status => Response::Status {
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            stats: engine.stats(),
        },

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }

        Request::ListInstances { query } => reply(engine.list_instances(&query), |instances| {
            Response::Instances { instances }
        }),

        Request::GetInstance { id } => reply(engine.get_instance(&id), |instance| {
            Response::Instance {
                instance: Box::new(instance),
            }
        }),

        Request::InstanceHistory { id, offset, limit } => {
            reply(engine.instance_history(&id, offset, limit), |page| {
                Response::Audit { page }
            })
        }

        Request::Transition { id, status, actor } => {
            reply(engine.transition(&id, &status, &actor).await, |instance| {
                Response::Instance {
                    instance: Box::new(instance),
                }
            })
        }

        Request::AddComment { id, body, actor } => {
            reply(engine.add_comment(&id, &body, &actor).await, |comment| {
                Response::Comment { comment }
            })
        }

        Request::DeleteComment {
            id,
            comment_id,
            actor,
        } => reply(
            engine.delete_comment(&id, &comment_id, &actor).await,
            |comment| Response::Comment { comment },
        ),

        Request::AttachFile {
            id,
            attachment,
            actor,
        } => reply(engine.attach_file(&id, attachment, &actor).await, |instance| {
            Response::Instance {
                instance: Box::new(instance),
            }
        }),

        Request::DetachFile {
            id,
            attachment_id,
            actor,
        } => reply(
            engine.detach_file(&id, &attachment_id, &actor).await,
            |attachment| Response::Attachment { attachment },
        ),

        Request::LinkEmail { id, email, actor } => {
            reply(engine.link_email(&id, email, &actor).await, |instance| {
                Response::Instance {
                    instance: Box::new(instance),
                }
            })
        }

        Request::UnlinkEmail {
            id,
            email_id,
            actor,
        } => reply(engine.unlink_email(&id, &email_id, &actor).await, |email| {
            Response::Email { email }
        }),

        Request::CarryOver { id, actor } => {
            reply(engine.carry_over(&id, &actor).await, |instance| {
                Response::Instance {
                    instance: Box::new(instance),
                }
            })
        }

        Request::Generate { period, actor } => {
            let period = period.unwrap_or_else(|| engine.current_period());
            reply(engine.ensure_generated(period, &actor).await, |report| {
                Response::Generation { report }
            })
        }

        Request::ListPeriods => Response::Periods {
            periods: engine.list_periods(),
        },

        Request::ClosePeriod { period, actor } => {
            reply(engine.close_period(period, &actor).await, |report| {
                Response::Closed { report }
            })
        }

        Request::ListStatuses => Response::Statuses {
            statuses: engine.list_statuses(),
        },

        Request::CreateStatus { spec, actor } => {
            reply(engine.create_status(spec, &actor).await, |status| {
                Response::WorkflowStatus { status }
            })
        }

        Request::UpdateStatus {
            status,
            patch,
            actor,
        } => reply(engine.update_status(&status, patch, &actor).await, |status| {
            Response::WorkflowStatus { status }
        }),

        Request::ReorderStatuses { order, actor } => {
            reply(engine.reorder_statuses(&order, &actor).await, |statuses| {
                Response::Statuses { statuses }
            })
        }

        Request::RetireStatus { status, actor } => {
            reply(engine.retire_status(&status, &actor).await, |status| {
                Response::WorkflowStatus { status }
            })
        }

        Request::DeleteStatus { status, actor } => {
            reply(engine.delete_status(&status, &actor).await, |status| {
                Response::WorkflowStatus { status }
            })
        }

        Request::ListProcessTypes => Response::ProcessTypes {
            process_types: engine.list_process_types(),
        },

        Request::GetProcessType { id } => reply(engine.get_process_type(&id), |process_type| {
            Response::ProcessType {
                process_type: Box::new(process_type),
            }
        }),

        Request::DefineProcessType { spec, actor } => reply(
            engine.define_process_type(None, spec, &actor).await,
            |process_type| Response::ProcessType {
                process_type: Box::new(process_type),
            },
        ),

        Request::ReviseProcessType { id, spec, actor } => reply(
            engine.revise_process_type(&id, spec, &actor).await,
            |process_type| Response::ProcessType {
                process_type: Box::new(process_type),
            },
        ),

        Request::RetireProcessType { id, actor } => reply(
            engine.retire_process_type(&id, &actor).await,
            |process_type| Response::ProcessType {
                process_type: Box::new(process_type),
            },
        ),

        Request::Browse {
            year,
            month,
            process_type,
        } => reply(
            engine.browse(year, month, process_type.as_deref()),
            |tree| Response::Archive { tree },
        ),

        Request::ArchiveSummaries => Response::Summaries {
            years: engine.archive_summaries(),
        },

        Request::Search { query, scope } => reply(engine.search(&query, &scope), |hits| {
            Response::SearchResults { hits }
        }),

        Request::InvalidateArchive { period } => {
            engine.invalidate_archive(period);
            Response::Ok
        }

        Request::QueryAudit { filter } => Response::Audit {
            page: engine.query_audit(&filter),
        },

        Request::AuditKinds => Response::AuditKinds {
            actions: engine.audit_action_kinds(),
            entities: engine.audit_entity_kinds(),
        },

        Request::VerifyAudit => reply(engine.verify_audit(), |report| Response::AuditVerified {
            report,
        }),

        Request::PruneAudit { actor } => {
            reply(engine.prune_audit(&actor), |removed| Response::Pruned { removed })
        }

        // Handled by the connection loop before dispatch
        Request::Subscribe { .. } => Response::error(
            ErrorKind::Internal,
            "subscriptions must be the first request on a connection",
        ),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
