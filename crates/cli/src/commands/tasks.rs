// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm tasks`: inspect and work on task instances

use anyhow::Result;
use clap::{Args, Subcommand};
use wfm_core::{AttachmentRef, EmailRef, Period};
use wfm_daemon::Request;
use wfm_engine::InstanceQuery;

use super::{expect_response, Context};
use crate::client::DaemonClient;
use crate::commands::audit::print_entries;
use crate::output::{emit, instance_detail, instance_table};

#[derive(Args)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub command: TasksCommand,
}

#[derive(Subcommand)]
pub enum TasksCommand {
    /// List task instances
    List {
        /// Only this period (YYYY-MM)
        #[arg(long)]
        period: Option<Period>,
        /// Only instances in this status (id or name)
        #[arg(long)]
        status: Option<String>,
        /// Only this process type (id or name)
        #[arg(long)]
        process: Option<String>,
        /// Hide completed and carried-over instances
        #[arg(long)]
        unfinished: bool,
    },
    /// Show one task instance
    Show { id: String },
    /// Audit history of one task instance
    History {
        id: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Move a task to another status
    Move {
        id: String,
        /// Target status (id or name)
        status: String,
    },
    /// Add a comment
    Comment {
        id: String,
        /// Comment text
        #[arg(required = true, num_args = 1..)]
        body: Vec<String>,
    },
    /// Soft-delete a comment
    Uncomment { id: String, comment_id: String },
    /// Attach a stored file reference
    Attach {
        id: String,
        /// Attachment store id
        #[arg(long = "ref")]
        reference: String,
        #[arg(long)]
        filename: String,
        #[arg(long, default_value_t = 0)]
        size: u64,
    },
    /// Remove an attachment reference
    Detach { id: String, attachment_id: String },
    /// Link an email by message id
    LinkEmail {
        id: String,
        email_id: String,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Remove an email link
    UnlinkEmail { id: String, email_id: String },
    /// Carry an unfinished task into the next period
    Carry { id: String },
}

pub async fn handle(command: TasksCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    let actor = ctx.actor.clone();
    match command {
        TasksCommand::List {
            period,
            status,
            process,
            unfinished,
        } => {
            let query = InstanceQuery {
                period,
                status,
                process_type: process,
                unfinished,
            };
            let instances = expect_response!(
                client.send(Request::ListInstances { query }).await?,
                Instances { instances }
            );
            emit(&instances, ctx.format, |i| instance_table(i));
        }

        TasksCommand::Show { id } => {
            let instance = expect_response!(
                client.send(Request::GetInstance { id }).await?,
                Instance { instance }
            );
            emit(&instance, ctx.format, |i| instance_detail(i));
        }

        TasksCommand::History { id, offset, limit } => {
            let page = expect_response!(
                client
                    .send(Request::InstanceHistory { id, offset, limit })
                    .await?,
                Audit { page }
            );
            emit(&page, ctx.format, print_entries);
        }

        TasksCommand::Move { id, status } => {
            let instance = expect_response!(
                client
                    .send(Request::Transition { id, status, actor })
                    .await?,
                Instance { instance }
            );
            emit(&instance, ctx.format, |i| {
                println!("{} is now {}", i.id, i.status);
            });
        }

        TasksCommand::Comment { id, body } => {
            let comment = expect_response!(
                client
                    .send(Request::AddComment {
                        id,
                        body: body.join(" "),
                        actor,
                    })
                    .await?,
                Comment { comment }
            );
            emit(&comment, ctx.format, |c| println!("Added comment {}", c.id));
        }

        TasksCommand::Uncomment { id, comment_id } => {
            let comment = expect_response!(
                client
                    .send(Request::DeleteComment {
                        id,
                        comment_id,
                        actor,
                    })
                    .await?,
                Comment { comment }
            );
            emit(&comment, ctx.format, |c| println!("Deleted comment {}", c.id));
        }

        TasksCommand::Attach {
            id,
            reference,
            filename,
            size,
        } => {
            let attachment = AttachmentRef {
                id: reference,
                filename,
                size,
            };
            let instance = expect_response!(
                client
                    .send(Request::AttachFile {
                        id,
                        attachment,
                        actor,
                    })
                    .await?,
                Instance { instance }
            );
            emit(&instance, ctx.format, |i| {
                println!("{} now has {} attachment(s)", i.id, i.attachments.len());
            });
        }

        TasksCommand::Detach { id, attachment_id } => {
            let attachment = expect_response!(
                client
                    .send(Request::DetachFile {
                        id,
                        attachment_id,
                        actor,
                    })
                    .await?,
                Attachment { attachment }
            );
            emit(&attachment, ctx.format, |a| {
                println!("Detached {} ({})", a.filename, a.id);
            });
        }

        TasksCommand::LinkEmail {
            id,
            email_id,
            subject,
        } => {
            let email = EmailRef {
                id: email_id,
                subject,
            };
            let instance = expect_response!(
                client
                    .send(Request::LinkEmail { id, email, actor })
                    .await?,
                Instance { instance }
            );
            emit(&instance, ctx.format, |i| {
                println!("{} now has {} linked email(s)", i.id, i.emails.len());
            });
        }

        TasksCommand::UnlinkEmail { id, email_id } => {
            let email = expect_response!(
                client
                    .send(Request::UnlinkEmail {
                        id,
                        email_id,
                        actor,
                    })
                    .await?,
                Email { email }
            );
            emit(&email, ctx.format, |e| println!("Unlinked email {}", e.id));
        }

        TasksCommand::Carry { id } => {
            let successor = expect_response!(
                client.send(Request::CarryOver { id, actor }).await?,
                Instance { instance }
            );
            emit(&successor, ctx.format, |s| {
                println!(
                    "Carried into {} as {}",
                    s.period(),
                    s.id
                );
            });
        }
    }
    Ok(())
}
