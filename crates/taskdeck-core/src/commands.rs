use std::io::{self, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::loader::LoadReport;
use crate::render::Renderer;
use crate::session::TaskSession;
use crate::store::Dispatched;
use crate::task::{Status, TaskDraft};
use crate::view::FilterCriteria;

#[instrument(skip_all)]
pub async fn dispatch(
    session: &mut TaskSession,
    renderer: &Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or_else(|| Command::List(ListArgs::default()));
    debug!(?command, "dispatching command");

    match session.bootstrap().await {
        LoadReport::Loaded(count) => debug!(count, "session bootstrapped"),
        LoadReport::Failed(reason) => debug!(%reason, "session bootstrapped without tasks"),
        LoadReport::Skipped => warn!("bootstrap skipped"),
    }

    match command {
        Command::List(args) => cmd_list(session, renderer, args),
        Command::Add(args) => cmd_add(session, args),
        Command::Edit(args) => cmd_edit(session, args),
        Command::SetStatus { id, status } => cmd_status(session, &id, status),
        Command::Delete { id } => cmd_delete(session, &id),
        Command::Export => cmd_export(session),
    }
}

fn cmd_list(session: &mut TaskSession, renderer: &Renderer, args: ListArgs) -> anyhow::Result<()> {
    let sort = args.sort_criteria();
    session.set_filter(FilterCriteria {
        status: args.status,
        priority: args.priority,
        date_range: args.range,
        search: args.search,
    });
    session.set_sort(sort);

    if let Some(notice) = session.notice() {
        return renderer.print_notice(&notice);
    }

    let tasks = session.visible_tasks();
    renderer.print_task_table(&tasks, session.sort(), session.calendar().today)
}

fn cmd_add(session: &mut TaskSession, args: AddArgs) -> anyhow::Result<()> {
    let today = session.calendar().today;
    let draft = TaskDraft {
        title: args.title,
        description: args.description,
        status: args.status,
        priority: args.priority,
        due_date: args.due.unwrap_or_else(|| TaskDraft::default_due_date(today)),
    };

    session.open_modal();
    let task = session.create_task(draft).context("task was not created")?;
    info!(id = %task.id, "task added");
    println!("Created task {}.", task.id);
    Ok(())
}

fn cmd_edit(session: &TaskSession, args: EditArgs) -> anyhow::Result<()> {
    let id = session.resolve_id(&args.id)?;
    let mut task = session
        .task(&id)
        .ok_or_else(|| anyhow!("task {id} disappeared"))?;

    if let Some(title) = args.title {
        task.title = title;
    }
    if let Some(description) = args.description {
        task.description = description;
    }
    if let Some(status) = args.status {
        task.status = status;
    }
    if let Some(priority) = args.priority {
        task.priority = priority;
    }
    if let Some(due) = args.due {
        task.due_date = due;
    }

    TaskDraft {
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status,
        priority: task.priority,
        due_date: task.due_date,
    }
    .validate()
    .context("edit rejected")?;

    report(session.update_task(task)?, &id, "Modified")
}

fn cmd_status(session: &TaskSession, id: &str, status: Status) -> anyhow::Result<()> {
    let id = session.resolve_id(id)?;
    report(session.set_task_status(&id, status)?, &id, "Updated")
}

fn cmd_delete(session: &TaskSession, id: &str) -> anyhow::Result<()> {
    let id = session.resolve_id(id)?;
    report(session.delete_task(&id)?, &id, "Deleted")
}

fn cmd_export(session: &TaskSession) -> anyhow::Result<()> {
    let tasks = session.tasks();
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &tasks)?;
    writeln!(out)?;
    Ok(())
}

fn report(outcome: Dispatched, id: &str, verb: &str) -> anyhow::Result<()> {
    match outcome {
        Dispatched::Applied => {
            println!("{verb} task {id}.");
        }
        Dispatched::NotFound(_) => {
            println!("No task {id}; nothing changed.");
        }
    }
    Ok(())
}
