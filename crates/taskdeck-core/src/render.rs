use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::task::{Priority, Status, Task};
use crate::view::{SortCriteria, SortDirection, SortField, ViewNotice};

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color()? && io::stdout().is_terminal();
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(
        &self,
        tasks: &[Task],
        sort: SortCriteria,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, tasks, sort, today)
    }

    pub fn write_task_table<W: Write>(
        &self,
        writer: W,
        tasks: &[Task],
        sort: SortCriteria,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            header_with_arrow("Title", SortField::Title, sort),
            "Status".to_string(),
            "Priority".to_string(),
            header_with_arrow("Due", SortField::DueDate, sort),
            "Description".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id: String = task.id.chars().take(SHORT_ID_LEN).collect();
            let due = task.due_date.format("%b %d, %Y").to_string();
            let due = if task.due_date < today && task.status != Status::Done {
                self.paint(&due, "31")
            } else {
                due
            };
            let status = match task.status {
                Status::Done => self.paint(task.status.as_str(), "32"),
                Status::InProgress => self.paint(task.status.as_str(), "33"),
                Status::Todo => task.status.to_string(),
            };
            let priority = match task.priority {
                Priority::High => self.paint(task.priority.as_str(), "31"),
                _ => task.priority.to_string(),
            };

            rows.push(vec![
                self.paint(&id, "36"),
                task.title.clone(),
                status,
                priority,
                due,
                task.description.clone(),
            ]);
        }

        write_table(writer, headers, rows)
    }

    pub fn print_notice(&self, notice: &ViewNotice) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", notice.message())?;
        Ok(())
    }

    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "status      {}", task.status)?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(out, "due         {}", task.due_date.format("%Y-%m-%d"))?;

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn header_with_arrow(label: &str, field: SortField, sort: SortCriteria) -> String {
    if sort.field != field {
        return label.to_string();
    }
    match sort.direction {
        SortDirection::Ascending => format!("{label} ▲"),
        SortDirection::Descending => format!("{label} ▼"),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        let padding = width.saturating_sub(UnicodeWidthStr::width(header.as_str()));
        write!(writer, "{header}{} ", " ".repeat(padding))?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
